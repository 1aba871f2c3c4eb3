pub mod loader;
pub mod resolver;

pub use loader::{ApplicationProfile, Platform, PlatformPaths};
pub use resolver::{expand_template, resolve, Environment, MapEnv, SystemEnv};
