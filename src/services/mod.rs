//! Desk-side collaborators of a session: exam lookup, activity feeds and
//! result sinks, either in-process ([`local_desk`]) or over HTTP ([`remote_desk`]).

pub mod client_config;
pub mod exam_access;
pub mod exam_codes;
pub mod local_desk;
pub mod remote_desk;

use thiserror::Error;

use crate::db::store::StoreError;

pub use client_config::ClientConfig;
pub use exam_access::AccessError;
pub use local_desk::LocalDesk;
pub use remote_desk::{RemoteDesk, RemoteDeskConfig};

#[derive(Debug, Error)]
pub enum DeskError {
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("exam '{0}' not found")]
    ExamNotFound(String),
    #[error("exam store failed: {0}")]
    Store(#[from] StoreError),
    #[error("exam desk unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("exam desk answered {status}: {detail}")]
    Rejected { status: u16, detail: String },
}
