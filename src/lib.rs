pub use engine::{BatchOp, Engine, EngineOptions, Pending};
pub use error::{Error, Result};
pub use events::Event;
pub use index::IndexDefinition;
pub use path::Path;
pub use query::{Predicate, QueryOptions};
pub use validator::Validator;

pub mod codec;
pub mod document;
pub mod engine;
pub mod error;
pub mod events;
pub mod index;
pub mod lock;
pub mod mutation;
pub mod path;
pub mod query;
pub mod queue;
pub mod recovery;
pub mod scheduler;
pub mod snapshot;
pub mod thread_pool;
pub mod validator;
pub mod wal;
