pub mod domain;
pub mod ports;

pub use domain::{
    Chapter, ChatMessage, ChatRole, ConsensusReceipt, MasterNote, Note, Quiz, Scope,
    SessionToken, TutorMode,
};
pub use ports::{ConsensusService, NoteService, PortError, PortResult, TutorService};
