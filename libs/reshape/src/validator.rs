//! Named field validators.
//!
//! A struct field opts in with an annotation such as
//! `"minlength=8,not_empty"`. Validators are separated by `,`; arguments
//! follow `=` and are separated by `|`. Each validator declares the type it
//! inspects, and the field value is converted into that type before the
//! call, so a `String` rule can check an integer field.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::engine::Engine;
use crate::error::{BoxError, ConvertError};
use crate::reflect::{Reflect, TypeInfo, Typed};
use crate::util;

type CallFn = Arc<dyn Fn(&mut dyn Reflect) -> Result<(), BoxError> + Send + Sync>;
type BindFn = Arc<dyn Fn(&Engine, &[String]) -> Result<CallFn, ConvertError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Receives a converted copy of the field.
    Value,
    /// Receives the field itself and may rewrite it.
    InPlace,
}

struct Registered {
    arg: &'static TypeInfo,
    mode: Mode,
    bind: BindFn,
}

/// Process-wide table of named validators.
#[derive(Default)]
pub struct ValidatorRegistry {
    entries: RwLock<HashMap<String, Arc<Registered>>>,
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = util::read(&self.entries, "validator registry");
        let mut names: Vec<_> = entries.keys().collect();
        names.sort();
        f.debug_struct("ValidatorRegistry")
            .field("names", &names)
            .finish()
    }
}

fn call_fn<F>(f: F) -> CallFn
where
    F: Fn(&mut dyn Reflect) -> Result<(), BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn bind_fn<F>(f: F) -> BindFn
where
    F: Fn(&Engine, &[String]) -> Result<CallFn, ConvertError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn take<T: Default + 'static>(value: &mut dyn Reflect) -> Option<T> {
    value.as_any_mut().downcast_mut::<T>().map(std::mem::take)
}

fn shape_error(info: &'static TypeInfo) -> BoxError {
    Box::new(ConvertError::ShapeMismatch(info.name()))
}

fn no_args(name: &str, args: &[String]) -> Result<(), ConvertError> {
    if args.is_empty() {
        return Ok(());
    }
    Err(ConvertError::ValidatorArgs {
        name: name.to_owned(),
        reason: format!("takes no arguments, got {}", args.len()),
    })
}

/// One argument converts from `String`, several from `Vec<String>`.
fn convert_args<A: Typed + Default>(
    engine: &Engine,
    name: &str,
    args: &[String],
) -> Result<A, ConvertError> {
    let converted = match args {
        [] => {
            return Err(ConvertError::ValidatorArgs {
                name: name.to_owned(),
                reason: "missing argument".to_owned(),
            });
        }
        [single] => engine.convert::<A>(single),
        many => engine.convert::<A>(&many.to_vec()),
    };
    converted.map_err(|e| ConvertError::ValidatorArgs {
        name: name.to_owned(),
        reason: e.to_string(),
    })
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, name: &str, registered: Registered) {
        debug!(validator = name, arg = registered.arg.name(), "registering validator");
        util::write(&self.entries, "validator registry")
            .insert(name.to_owned(), Arc::new(registered));
    }

    /// Register a validator receiving a converted copy of the field.
    pub fn register<T, E, F>(&self, name: &str, f: F)
    where
        T: Typed + Clone + Default,
        E: Into<BoxError>,
        F: Fn(T) -> Result<(), E> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let owned = name.to_owned();
        let bind = bind_fn(move |_, args| {
            no_args(&owned, args)?;
            let f = f.clone();
            Ok(call_fn(move |value| {
                let value = take::<T>(value).ok_or_else(|| shape_error(T::type_info()))?;
                f(value).map_err(Into::into)
            }))
        });
        self.insert(
            name,
            Registered {
                arg: T::type_info(),
                mode: Mode::Value,
                bind,
            },
        );
    }

    /// Register a validator that may rewrite the field in place.
    pub fn register_mut<T, E, F>(&self, name: &str, f: F)
    where
        T: Typed + Clone + Default,
        E: Into<BoxError>,
        F: Fn(&mut T) -> Result<(), E> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let owned = name.to_owned();
        let bind = bind_fn(move |_, args| {
            no_args(&owned, args)?;
            let f = f.clone();
            Ok(call_fn(move |value| {
                let value = value
                    .as_any_mut()
                    .downcast_mut::<T>()
                    .ok_or_else(|| shape_error(T::type_info()))?;
                f(value).map_err(Into::into)
            }))
        });
        self.insert(
            name,
            Registered {
                arg: T::type_info(),
                mode: Mode::InPlace,
                bind,
            },
        );
    }

    /// Register a validator taking a configuration argument from the
    /// annotation, e.g. `minlength=8`.
    pub fn register_with_args<T, A, E, F>(&self, name: &str, f: F)
    where
        T: Typed + Clone + Default,
        A: Typed + Clone + Default,
        E: Into<BoxError>,
        F: Fn(T, &A) -> Result<(), E> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let owned = name.to_owned();
        let bind = bind_fn(move |engine, args| {
            let arg = convert_args::<A>(engine, &owned, args)?;
            let f = f.clone();
            Ok(call_fn(move |value| {
                let value = take::<T>(value).ok_or_else(|| shape_error(T::type_info()))?;
                f(value, &arg).map_err(Into::into)
            }))
        });
        self.insert(
            name,
            Registered {
                arg: T::type_info(),
                mode: Mode::Value,
                bind,
            },
        );
    }

    pub fn register_mut_with_args<T, A, E, F>(&self, name: &str, f: F)
    where
        T: Typed + Clone + Default,
        A: Typed + Clone + Default,
        E: Into<BoxError>,
        F: Fn(&mut T, &A) -> Result<(), E> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let owned = name.to_owned();
        let bind = bind_fn(move |engine, args| {
            let arg = convert_args::<A>(engine, &owned, args)?;
            let f = f.clone();
            Ok(call_fn(move |value| {
                let value = value
                    .as_any_mut()
                    .downcast_mut::<T>()
                    .ok_or_else(|| shape_error(T::type_info()))?;
                f(value, &arg).map_err(Into::into)
            }))
        });
        self.insert(
            name,
            Registered {
                arg: T::type_info(),
                mode: Mode::InPlace,
                bind,
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        util::read(&self.entries, "validator registry").contains_key(name)
    }

    /// Parse an annotation and bind every validator it names, in order.
    pub fn lookup(
        &self,
        engine: &Engine,
        annotation: &str,
    ) -> Result<Vec<ValidatorBinding>, ConvertError> {
        let mut bindings = Vec::new();
        for entry in annotation.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, args) = match entry.split_once('=') {
                Some((name, args)) => (
                    name.trim(),
                    args.split('|').map(|a| a.trim().to_owned()).collect::<Vec<_>>(),
                ),
                None => (entry, Vec::new()),
            };
            let registered = util::read(&self.entries, "validator registry")
                .get(name)
                .cloned()
                .ok_or_else(|| ConvertError::UnknownValidator(name.to_owned()))?;
            let call = (registered.bind)(engine, &args)?;
            bindings.push(ValidatorBinding {
                name: name.to_owned(),
                arg: registered.arg,
                mode: registered.mode,
                call,
            });
        }
        Ok(bindings)
    }
}

/// A validator bound to its parsed arguments, ready to run on a field.
#[derive(Clone)]
pub struct ValidatorBinding {
    name: String,
    arg: &'static TypeInfo,
    mode: Mode,
    call: CallFn,
}

impl fmt::Debug for ValidatorBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorBinding")
            .field("name", &self.name)
            .field("arg", &self.arg.name())
            .field("mode", &self.mode)
            .finish()
    }
}

impl ValidatorBinding {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run against a field that already holds its converted value.
    pub fn invoke(&self, engine: &Engine, field: &mut dyn Reflect) -> Result<(), ConvertError> {
        let rejected = |e: BoxError| ConvertError::Validation(Arc::from(e));

        if self.mode == Mode::InPlace && field.type_of().id() == self.arg.id() {
            return (self.call)(field).map_err(rejected);
        }

        let mut arg = self.arg.new_default();
        engine.dispatch(&mut *arg, &*field)?;
        (self.call)(&mut *arg).map_err(rejected)?;
        if self.mode == Mode::InPlace {
            engine.dispatch(field, &*arg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn bare_engine() -> Engine {
        Engine::with_config(EngineConfig::default().without_std_validators())
    }

    #[test]
    fn unknown_names_fail_lookup() {
        let engine = bare_engine();
        let err = engine.validators().lookup(&engine, "nope").unwrap_err();
        assert!(matches!(err, ConvertError::UnknownValidator(name) if name == "nope"));
    }

    #[test]
    fn annotation_keeps_declared_order() {
        let engine = bare_engine();
        engine.validators().register("a", |_: String| Ok::<_, BoxError>(()));
        engine
            .validators()
            .register_with_args("b", |_: String, _: &i64| Ok::<_, BoxError>(()));
        let bindings = engine.validators().lookup(&engine, " b=3 , a ,").unwrap();
        let names: Vec<_> = bindings.iter().map(ValidatorBinding::name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn argument_errors_name_the_validator() {
        let engine = bare_engine();
        engine
            .validators()
            .register_with_args("len", |_: String, _: &u32| Ok::<_, BoxError>(()));
        engine.validators().register("plain", |_: String| Ok::<_, BoxError>(()));

        let err = engine.validators().lookup(&engine, "len=abc").unwrap_err();
        assert!(matches!(&err, ConvertError::ValidatorArgs { name, .. } if name == "len"));
        let err = engine.validators().lookup(&engine, "len").unwrap_err();
        assert!(matches!(&err, ConvertError::ValidatorArgs { name, .. } if name == "len"));
        let err = engine.validators().lookup(&engine, "plain=1").unwrap_err();
        assert!(matches!(&err, ConvertError::ValidatorArgs { name, .. } if name == "plain"));
    }

    #[test]
    fn several_arguments_convert_from_a_list() {
        let engine = bare_engine();
        engine.validators().register_with_args("oneof", |v: String, allowed: &Vec<String>| {
            if allowed.contains(&v) {
                Ok(())
            } else {
                Err(format!("{v} is not one of {}", allowed.join(", ")))
            }
        });
        let bindings = engine.validators().lookup(&engine, "oneof=red|green").unwrap();
        let mut field = "blue".to_string();
        let err = bindings[0].invoke(&engine, &mut field).unwrap_err();
        assert_eq!(err.to_string(), "blue is not one of red, green");
        let mut field = "red".to_string();
        bindings[0].invoke(&engine, &mut field).unwrap();
    }

    #[test]
    fn in_place_validators_write_back_through_conversion() {
        let engine = bare_engine();
        engine.validators().register_mut("double", |v: &mut i64| {
            *v *= 2;
            Ok::<_, BoxError>(())
        });
        let bindings = engine.validators().lookup(&engine, "double").unwrap();

        let mut same = 21i64;
        bindings[0].invoke(&engine, &mut same).unwrap();
        assert_eq!(same, 42);

        let mut text = "5".to_string();
        bindings[0].invoke(&engine, &mut text).unwrap();
        assert_eq!(text, "10");
    }
}
