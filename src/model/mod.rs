pub mod prefs;
pub mod remote;
