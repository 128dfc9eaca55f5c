//! Application state and composition.

use std::sync::Arc;

use crate::infrastructure::{
    cache::SnapshotCache,
    config::EngineConfig,
    ports::{
        AccountDirectoryPort, ClockPort, JobQueuePort, RandomPort, RendererPort, Store, VisionPort,
    },
};
use crate::use_cases;

/// Adapters the application is wired from.
pub struct Ports {
    pub store: Arc<dyn Store>,
    pub queue: Arc<dyn JobQueuePort>,
    pub vision: Arc<dyn VisionPort>,
    pub renderer: Arc<dyn RendererPort>,
    pub directory: Arc<dyn AccountDirectoryPort>,
    pub clock: Arc<dyn ClockPort>,
    pub random: Arc<dyn RandomPort>,
}

/// Main application state.
///
/// Holds the store, the job queue and all use cases.
/// Passed to HTTP handlers via Axum state.
pub struct App {
    pub store: Arc<dyn Store>,
    pub queue: Arc<dyn JobQueuePort>,
    pub use_cases: UseCases,
    clock: Arc<dyn ClockPort>,
    random: Arc<dyn RandomPort>,
    config: EngineConfig,
}

/// Container for all use cases.
pub struct UseCases {
    pub games: use_cases::GameAuthoring,
    pub templates: use_cases::SheetTemplates,
    pub images: use_cases::SheetImages,
    pub instances: use_cases::Instances,
    pub uploads: use_cases::TurnSheetUploads,
    pub sheets: use_cases::TurnSheetQueries,
    pub renderer: Arc<use_cases::SheetRenderer>,
    pub advancer: Arc<use_cases::TurnAdvancer>,
    pub enrollment: Arc<use_cases::PlayerEnrollment>,
}

impl App {
    /// Create a new App with all dependencies wired up.
    pub fn new(ports: Ports, config: EngineConfig) -> Self {
        let Ports {
            store,
            queue,
            vision,
            renderer,
            directory,
            clock,
            random,
        } = ports;

        // Frozen templates are shared by starts, advances and renders.
        let cache = Arc::new(SnapshotCache::new());
        let registry = Arc::new(use_cases::ScannerRegistry::standard(
            vision,
            config.scan_timeout,
        ));

        let use_cases = UseCases {
            games: use_cases::GameAuthoring::new(store.clone(), clock.clone()),
            templates: use_cases::SheetTemplates::new(store.clone(), clock.clone()),
            images: use_cases::SheetImages::new(store.clone(), clock.clone(), config.image_bounds),
            instances: use_cases::Instances::new(
                store.clone(),
                queue.clone(),
                clock.clone(),
                cache.clone(),
            ),
            uploads: use_cases::TurnSheetUploads::new(
                store.clone(),
                queue.clone(),
                clock.clone(),
                registry,
            ),
            sheets: use_cases::TurnSheetQueries::new(store.clone()),
            renderer: Arc::new(use_cases::SheetRenderer::new(
                store.clone(),
                renderer,
                clock.clone(),
                cache.clone(),
                config.render_timeout,
            )),
            advancer: Arc::new(use_cases::TurnAdvancer::new(
                store.clone(),
                queue.clone(),
                clock.clone(),
                cache,
            )),
            enrollment: Arc::new(use_cases::PlayerEnrollment::new(
                store.clone(),
                directory,
                clock.clone(),
                config.directory_timeout,
            )),
        };

        Self {
            store,
            queue,
            use_cases,
            clock,
            random,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Worker for the `advance-if-ready`, `render-sheet` and `join-player` jobs.
    pub fn job_runner(&self) -> use_cases::JobRunner {
        use_cases::JobRunner::new(
            self.queue.clone(),
            self.clock.clone(),
            self.random.clone(),
            self.config.retry.clone(),
            self.use_cases.advancer.clone(),
            self.use_cases.renderer.clone(),
            self.use_cases.enrollment.clone(),
        )
    }

    pub fn deadline_sweeper(&self) -> use_cases::DeadlineSweeper {
        use_cases::DeadlineSweeper::new(
            self.store.clone(),
            self.queue.clone(),
            self.clock.clone(),
            self.config.deadline_sweep,
        )
    }
}
