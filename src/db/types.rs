use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Teachers,
    Exams,
    Results,
    AppConfig,
}

impl Collection {
    pub const ALL: [Collection; 4] =
        [Collection::Teachers, Collection::Exams, Collection::Results, Collection::AppConfig];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Teachers => "teachers",
            Self::Exams => "exams",
            Self::Results => "results",
            Self::AppConfig => "app_config",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One entry of a collection's change feed. `data` is the document body after
/// the change and is `None` for removals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub kind: ChangeKind,
    pub id: String,
    pub data: Option<serde_json::Value>,
}
