mod fixtures;
mod scripted;
mod world;

pub use fixtures::{Notice, RecordingNotifier, StaticSession, init_test_tracing};
pub use scripted::{Call, Gate, ScriptedStore};
pub use world::TestWorld;
