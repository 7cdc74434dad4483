pub mod add;
pub mod events;
pub mod preview;
pub mod remove;
pub mod run;
pub mod sources;
pub mod sync;
