pub mod events;
pub mod params;
pub mod prompts;
pub mod themes;
