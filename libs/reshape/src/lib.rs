//! Dynamic value conversion between arbitrary Rust types.
//!
//! ```ignore
//! use reshape::Reflect;
//!
//! #[derive(Reflect, Clone, Default)]
//! pub struct User {
//!     #[reshape(rename = "login", validate = "not_empty")]
//!     pub name: String,
//!     pub age: u32,
//! }
//!
//! let src = reshape::Value::from_iter([("login", "ann"), ("age", "30")]);
//! let user: User = reshape::convert(&src)?;
//! ```

extern crate self as reshape;

pub mod cache;
pub mod coerce;
pub mod config;
pub mod engine;
pub mod error;
pub mod reflect;
pub mod std_validators;
pub mod validator;
pub mod value;

mod util;

pub use reshape_derive::Reflect;

pub use config::{EngineConfig, MapFieldOrder, OverflowPolicy};
pub use engine::Engine;
pub use error::{BoxError, ConvertError, ErrorKind};
pub use reflect::{AssignSource, Kind, Reflect, ScanTarget, TypeFn, TypeInfo, Typed};
pub use validator::ValidatorRegistry;
pub use value::{RawJson, Value};

/// [`Engine::assign`] on the global engine.
pub fn assign(dst: &mut dyn Reflect, src: &dyn Reflect) -> Result<(), ConvertError> {
    Engine::global().assign(dst, src)
}

/// [`Engine::convert`] on the global engine.
pub fn convert<T: Typed + Default>(src: &dyn Reflect) -> Result<T, ConvertError> {
    Engine::global().convert(src)
}

/// [`Engine::validate`] on the global engine.
pub fn validate(target: &mut dyn Reflect) -> Result<(), ConvertError> {
    Engine::global().validate(target)
}

/// Validators of the global engine.
pub fn validators() -> &'static ValidatorRegistry {
    Engine::global().validators()
}
