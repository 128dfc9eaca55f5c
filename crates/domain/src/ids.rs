use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            pub fn to_uuid(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

// Authored world
define_id!(GameId);
define_id!(LocationId);
define_id!(LocationLinkId);
define_id!(LinkRequirementId);
define_id!(CreatureId);
define_id!(ItemId);
define_id!(CreaturePlacementId);
define_id!(ItemPlacementId);
define_id!(CharacterId);
define_id!(SheetTemplateId);
define_id!(GameImageId);

// Accounts and subscriptions (accounts live in an external directory)
define_id!(AccountId);
define_id!(SubscriptionId);

// Live world
define_id!(GameInstanceId);
define_id!(LocationInstanceId);
define_id!(CreatureInstanceId);
define_id!(ItemInstanceId);
define_id!(CharacterInstanceId);

// Turn sheets and intake
define_id!(TurnSheetId);
define_id!(JoinSubmissionId);

// Scheduler
define_id!(JobId);
