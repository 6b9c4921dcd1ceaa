use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(super) struct DeleteResultsQuery {
    #[serde(default)]
    pub(super) room: Option<String>,
}

impl DeleteResultsQuery {
    /// A blank `room` means every result of the exam.
    pub(super) fn room(&self) -> Option<&str> {
        self.room.as_deref().map(str::trim).filter(|room| !room.is_empty())
    }
}
