//! Conversion synthesis and execution.
//!
//! [`Engine::resolve`] turns a `(destination, source)` type pair into a
//! [`Procedure`] once and caches it. Rules are tried in a fixed order:
//!
//! 1. identical types are cloned
//! 2. dynamic destinations take a rendering of any source
//! 3. pointer layers are peeled until both sides have the same depth
//! 4. the destination's scan hook, then the source's assign-to hook
//! 5. the destination kind decides the strategy
//!
//! Sub-procedures for fields, elements, keys and pointees are obtained
//! through `resolve` as well, so a self-referential pair meets its own
//! placeholder instead of recursing forever.

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, trace};

use crate::cache::{Claim, Procedure, ProcedureCache, TypePair, procedure};
use crate::coerce;
use crate::config::{EngineConfig, MapFieldOrder};
use crate::error::ConvertError;
use crate::reflect::{
    Kind, NumberKind, Reflect, ReflectMut, ReflectRef, StructAccess, StructInfo, TypeInfo, Typed,
};
use crate::std_validators;
use crate::util;
use crate::validator::{ValidatorBinding, ValidatorRegistry};
use crate::value::Value;

fn shape(name: &'static str) -> ConvertError {
    ConvertError::ShapeMismatch(name)
}

fn impossible(dst: &TypeInfo, src: &TypeInfo) -> ConvertError {
    ConvertError::Impossible {
        src: src.name(),
        dst: dst.name(),
    }
}

fn is_null(src: &dyn Reflect) -> bool {
    matches!(
        src.reflect_ref(),
        ReflectRef::Pointer(None) | ReflectRef::Dynamic(None)
    )
}

// ════════════════════════════════════════════════════════════════
//  Field bindings
// ════════════════════════════════════════════════════════════════

/// Validators of one struct field, in annotation order.
#[derive(Debug, Clone)]
struct FieldValidators {
    index: usize,
    name: &'static str,
    bindings: Vec<ValidatorBinding>,
}

type StructValidators = Arc<Vec<FieldValidators>>;

fn validators_for(all: &[FieldValidators], index: usize) -> Vec<ValidatorBinding> {
    all.iter()
        .find(|fv| fv.index == index)
        .map(|fv| fv.bindings.clone())
        .unwrap_or_default()
}

/// Destination field, its conversion and its validators.
struct FieldBinding {
    name: &'static str,
    target: usize,
    convert: Procedure,
    validators: Vec<ValidatorBinding>,
}

impl FieldBinding {
    fn apply(
        &self,
        engine: &Engine,
        into: &mut dyn StructAccess,
        value: &dyn Reflect,
        owner: &'static str,
    ) -> Result<(), ConvertError> {
        let field = into.field_mut(self.target).ok_or(shape(owner))?;
        (self.convert)(engine, &mut *field, value).map_err(|e| e.with_field(self.name))?;
        for validator in &self.validators {
            validator
                .invoke(engine, &mut *field)
                .map_err(|e| e.with_field(self.name))?;
        }
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════
//  Engine
// ════════════════════════════════════════════════════════════════

pub struct Engine {
    config: EngineConfig,
    cache: ProcedureCache,
    validators: ValidatorRegistry,
    struct_validators: RwLock<HashMap<TypeId, StructValidators>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("validators", &self.validators)
            .finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let validators = ValidatorRegistry::new();
        if config.std_validators {
            std_validators::register(&validators);
        }
        Self {
            config,
            cache: ProcedureCache::new(),
            validators,
            struct_validators: RwLock::new(HashMap::new()),
        }
    }

    /// Process-wide engine with the default configuration.
    pub fn global() -> &'static Engine {
        static GLOBAL: OnceLock<Engine> = OnceLock::new();
        GLOBAL.get_or_init(Engine::new)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn validators(&self) -> &ValidatorRegistry {
        &self.validators
    }

    pub fn cache(&self) -> &ProcedureCache {
        &self.cache
    }

    /// Convert `src` into `dst` in place.
    ///
    /// On failure `dst` may be partially written.
    pub fn assign(&self, dst: &mut dyn Reflect, src: &dyn Reflect) -> Result<(), ConvertError> {
        if matches!(src.reflect_ref(), ReflectRef::Dynamic(None)) {
            return Err(ConvertError::InvalidSource);
        }
        self.dispatch(dst, src)
    }

    /// Convert `src` into a new `T`.
    pub fn convert<T: Typed + Default>(&self, src: &dyn Reflect) -> Result<T, ConvertError> {
        let mut out = T::default();
        self.assign(&mut out, src)?;
        Ok(out)
    }

    /// Run every field validator of a struct, in declaration order.
    /// Pointers are followed; values that are not structs pass.
    pub fn validate(&self, target: &mut dyn Reflect) -> Result<(), ConvertError> {
        let info = target.type_of();
        match target.reflect_mut() {
            ReflectMut::Pointer(ptr) => match ptr.get_mut() {
                Some(inner) => self.validate(inner),
                None => Ok(()),
            },
            ReflectMut::Struct(access) => {
                for fv in self.struct_validators(info)?.iter() {
                    let field = access.field_mut(fv.index).ok_or(shape(info.name()))?;
                    for validator in &fv.bindings {
                        validator
                            .invoke(self, &mut *field)
                            .map_err(|e| e.with_field(fv.name))?;
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Convert without the top-level null check.
    pub(crate) fn dispatch(&self, dst: &mut dyn Reflect, src: &dyn Reflect) -> Result<(), ConvertError> {
        let procedure = self.resolve(dst.type_of(), src.type_of())?;
        procedure(self, dst, src)
    }

    /// Procedure converting values of `src` into values of `dst`.
    pub fn resolve(
        &self,
        dst: &'static TypeInfo,
        src: &'static TypeInfo,
    ) -> Result<Procedure, ConvertError> {
        if dst.id() == src.id() {
            return Ok(identity());
        }
        let pair = TypePair::new(dst, src);
        if let Some(found) = self.cache.get(&pair) {
            return Ok(found);
        }
        match self.cache.claim(pair) {
            Claim::Ready(found) => Ok(found),
            Claim::Reserved(reservation) => {
                debug!(src = src.name(), dst = dst.name(), "synthesizing conversion");
                match self.synthesize(dst, src) {
                    Ok(built) => {
                        trace!(src = src.name(), dst = dst.name(), "conversion published");
                        reservation.publish(built.clone());
                        Ok(built)
                    }
                    Err(err) => {
                        debug!(src = src.name(), dst = dst.name(), %err, "conversion synthesis failed");
                        reservation.fail(&err);
                        Err(err)
                    }
                }
            }
        }
    }

    fn struct_validators(&self, info: &'static TypeInfo) -> Result<StructValidators, ConvertError> {
        if let Some(found) = util::read(&self.struct_validators, "struct validators")
            .get(&info.id())
            .cloned()
        {
            return Ok(found);
        }

        let mut all = Vec::new();
        if let Some(layout) = info.struct_info() {
            for (index, field) in layout.fields.iter().enumerate() {
                let Some(annotation) = field.validate else {
                    continue;
                };
                if field.resolved_name().is_none() {
                    continue;
                }
                let bindings = self
                    .validators
                    .lookup(self, annotation)
                    .map_err(|e| e.with_field(field.name))?;
                all.push(FieldValidators {
                    index,
                    name: field.name,
                    bindings,
                });
            }
        }

        let all = Arc::new(all);
        util::write(&self.struct_validators, "struct validators").insert(info.id(), all.clone());
        Ok(all)
    }

    // ── synthesis ───────────────────────────────────────────────

    fn synthesize(
        &self,
        dst_ty: &'static TypeInfo,
        src_ty: &'static TypeInfo,
    ) -> Result<Procedure, ConvertError> {
        if matches!(dst_ty.kind(), Kind::Dynamic) {
            return self.to_value(dst_ty, src_ty);
        }

        let (src_depth, dst_depth) = (src_ty.pointer_depth(), dst_ty.pointer_depth());
        if src_depth > dst_depth {
            return self.deref_then_convert(dst_ty, src_ty);
        }
        if dst_depth > 0 {
            return self.alloc_then_convert(dst_ty, src_ty);
        }

        if dst_ty.capabilities().scan {
            return Ok(scan_hook(dst_ty));
        }
        if src_ty.capabilities().assign_to {
            return Ok(assign_to_hook(src_ty));
        }

        match dst_ty.kind() {
            Kind::String => Ok(to_string(dst_ty, src_ty)),
            Kind::Bool => Ok(to_bool(dst_ty)),
            Kind::Number(kind) => Ok(to_number(*kind)),
            Kind::Bytes => to_bytes(dst_ty, src_ty),
            Kind::Seq { elem } => self.to_seq(dst_ty, src_ty, elem()),
            Kind::Map { key, value } => self.to_map(dst_ty, src_ty, key(), value()),
            Kind::Struct(layout) => self.to_struct(dst_ty, src_ty, layout),
            Kind::Pointer { .. } | Kind::Dynamic | Kind::Opaque => Err(impossible(dst_ty, src_ty)),
        }
    }

    fn deref_then_convert(
        &self,
        dst_ty: &'static TypeInfo,
        src_ty: &'static TypeInfo,
    ) -> Result<Procedure, ConvertError> {
        let Kind::Pointer { pointee, .. } = src_ty.kind() else {
            return Err(shape(src_ty.name()));
        };
        let inner = self.resolve(dst_ty, pointee())?;
        let src_name = src_ty.name();
        Ok(procedure(move |engine, dst, src| match src.reflect_ref() {
            ReflectRef::Pointer(Some(value)) => inner(engine, dst, value),
            ReflectRef::Pointer(None) => Err(ConvertError::NilPointerRead),
            _ => Err(shape(src_name)),
        }))
    }

    fn alloc_then_convert(
        &self,
        dst_ty: &'static TypeInfo,
        src_ty: &'static TypeInfo,
    ) -> Result<Procedure, ConvertError> {
        let Kind::Pointer { pointee, nullable } = *dst_ty.kind() else {
            return Err(shape(dst_ty.name()));
        };
        let inner = self.resolve(pointee(), src_ty)?;
        let dst_name = dst_ty.name();
        Ok(procedure(move |engine, dst, src| {
            let ReflectMut::Pointer(ptr) = dst.reflect_mut() else {
                return Err(shape(dst_name));
            };
            if nullable && is_null(src) {
                ptr.clear();
                return Ok(());
            }
            inner(engine, ptr.get_or_alloc(), src)
        }))
    }

    /// Rendering into a dynamic destination. Source pointers are peeled
    /// first, so a hook on the pointee still applies.
    fn to_value(
        &self,
        dst_ty: &'static TypeInfo,
        src_ty: &'static TypeInfo,
    ) -> Result<Procedure, ConvertError> {
        let src_name = src_ty.name();
        match src_ty.kind() {
            Kind::Pointer { pointee, .. } => {
                let inner = self.resolve(dst_ty, pointee())?;
                Ok(procedure(move |engine, dst, src| match src.reflect_ref() {
                    ReflectRef::Pointer(Some(value)) => inner(engine, dst, value),
                    ReflectRef::Pointer(None) => store_value(dst, Value::Null),
                    _ => Err(shape(src_name)),
                }))
            }
            _ if src_ty.capabilities().assign_to => Ok(assign_to_hook(src_ty)),
            Kind::Bool | Kind::Number(_) | Kind::String | Kind::Bytes => Ok(scalar_to_value()),
            Kind::Seq { elem } => {
                let convert = self.resolve(dst_ty, elem())?;
                Ok(procedure(move |engine, dst, src| {
                    let ReflectRef::Seq(items) = src.reflect_ref() else {
                        return Err(shape(src_name));
                    };
                    let mut out = Vec::with_capacity(items.len());
                    for idx in 0..items.len() {
                        let item = items.get(idx).ok_or(shape(src_name))?;
                        let mut rendered = Value::Null;
                        convert(engine, &mut rendered, item)?;
                        out.push(rendered);
                    }
                    store_value(dst, Value::Array(out))
                }))
            }
            Kind::Map { value, .. } => {
                let convert = self.resolve(dst_ty, value())?;
                Ok(procedure(move |engine, dst, src| {
                    let ReflectRef::Map(entries) = src.reflect_ref() else {
                        return Err(shape(src_name));
                    };
                    let mut out = BTreeMap::new();
                    for (key, item) in entries.iter() {
                        let (name, ok) = coerce::to_string(key);
                        if !ok {
                            return Err(ConvertError::Coerce {
                                src: key.type_of().name(),
                                dst: String::type_info().name(),
                            });
                        }
                        let mut rendered = Value::Null;
                        convert(engine, &mut rendered, item)?;
                        out.insert(name, rendered);
                    }
                    store_value(dst, Value::Map(out))
                }))
            }
            Kind::Struct(layout) => {
                let mut fields = Vec::new();
                for (idx, name, field) in layout.resolved() {
                    let Some(field_ty) = field.type_info() else {
                        continue;
                    };
                    let convert = self
                        .resolve(dst_ty, field_ty)
                        .map_err(|e| e.with_field(field.name))?;
                    fields.push((idx, name, convert));
                }
                Ok(procedure(move |engine, dst, src| {
                    let ReflectRef::Struct(from) = src.reflect_ref() else {
                        return Err(shape(src_name));
                    };
                    let mut out = BTreeMap::new();
                    for (idx, name, convert) in &fields {
                        let field = from.field(*idx).ok_or(shape(src_name))?;
                        let mut rendered = Value::Null;
                        convert(engine, &mut rendered, field).map_err(|e| e.with_field(name))?;
                        out.insert((*name).to_owned(), rendered);
                    }
                    store_value(dst, Value::Map(out))
                }))
            }
            Kind::Dynamic => Ok(procedure(move |engine, dst, src| match src.reflect_ref() {
                ReflectRef::Dynamic(Some(inner)) => engine.dispatch(dst, inner),
                ReflectRef::Dynamic(None) => store_value(dst, Value::Null),
                _ => Err(shape(src_name)),
            })),
            Kind::Opaque => Err(impossible(dst_ty, src_ty)),
        }
    }

    fn to_seq(
        &self,
        dst_ty: &'static TypeInfo,
        src_ty: &'static TypeInfo,
        elem: &'static TypeInfo,
    ) -> Result<Procedure, ConvertError> {
        let dst_name = dst_ty.name();
        match src_ty.kind() {
            Kind::Seq { elem: src_elem } => {
                let convert = self.resolve(elem, src_elem())?;
                Ok(procedure(move |engine, dst, src| {
                    let ReflectRef::Seq(items) = src.reflect_ref() else {
                        return Err(shape(dst_name));
                    };
                    let ReflectMut::Seq(out) = dst.reflect_mut() else {
                        return Err(shape(dst_name));
                    };
                    out.reset(items.len());
                    for idx in 0..items.len() {
                        let (Some(slot), Some(item)) = (out.get_mut(idx), items.get(idx)) else {
                            return Err(shape(dst_name));
                        };
                        convert(engine, slot, item)?;
                    }
                    Ok(())
                }))
            }
            Kind::Bytes => {
                let convert = self.resolve(elem, u8::type_info())?;
                Ok(procedure(move |engine, dst, src| {
                    let ReflectRef::Bytes(bytes) = src.reflect_ref() else {
                        return Err(shape(dst_name));
                    };
                    let ReflectMut::Seq(out) = dst.reflect_mut() else {
                        return Err(shape(dst_name));
                    };
                    out.reset(bytes.len());
                    for (idx, byte) in bytes.iter().enumerate() {
                        let slot = out.get_mut(idx).ok_or(shape(dst_name))?;
                        convert(engine, slot, byte)?;
                    }
                    Ok(())
                }))
            }
            Kind::Dynamic => Ok(runtime()),
            _ => Err(impossible(dst_ty, src_ty)),
        }
    }

    fn to_map(
        &self,
        dst_ty: &'static TypeInfo,
        src_ty: &'static TypeInfo,
        key_ty: &'static TypeInfo,
        value_ty: &'static TypeInfo,
    ) -> Result<Procedure, ConvertError> {
        let dst_name = dst_ty.name();
        match src_ty.kind() {
            Kind::Map { key, value } => {
                let convert_key = self.resolve(key_ty, key())?;
                let convert_value = self.resolve(value_ty, value())?;
                Ok(procedure(move |engine, dst, src| {
                    let ReflectRef::Map(entries) = src.reflect_ref() else {
                        return Err(shape(dst_name));
                    };
                    let ReflectMut::Map(out) = dst.reflect_mut() else {
                        return Err(shape(dst_name));
                    };
                    out.clear();
                    for (k, v) in entries.iter() {
                        let mut new_key = key_ty.new_default();
                        convert_key(engine, &mut *new_key, k)?;
                        let mut new_value = value_ty.new_default();
                        convert_value(engine, &mut *new_value, v)?;
                        if !out.insert(new_key, new_value) {
                            return Err(shape(dst_name));
                        }
                    }
                    Ok(())
                }))
            }
            Kind::Struct(layout) => {
                if !matches!(key_ty.kind(), Kind::String) {
                    return Err(impossible(dst_ty, src_ty));
                }
                let mut fields = Vec::new();
                for (idx, name, field) in layout.resolved() {
                    let Some(field_ty) = field.type_info() else {
                        continue;
                    };
                    let convert = self
                        .resolve(value_ty, field_ty)
                        .map_err(|e| e.with_field(field.name))?;
                    fields.push((idx, name, convert));
                }
                Ok(procedure(move |engine, dst, src| {
                    let ReflectRef::Struct(from) = src.reflect_ref() else {
                        return Err(shape(dst_name));
                    };
                    let ReflectMut::Map(out) = dst.reflect_mut() else {
                        return Err(shape(dst_name));
                    };
                    out.clear();
                    for (idx, name, convert) in &fields {
                        let field = from.field(*idx).ok_or(shape(dst_name))?;
                        let mut new_value = value_ty.new_default();
                        convert(engine, &mut *new_value, field).map_err(|e| e.with_field(name))?;
                        if !out.insert(Box::new((*name).to_owned()), new_value) {
                            return Err(shape(dst_name));
                        }
                    }
                    Ok(())
                }))
            }
            Kind::Dynamic => Ok(runtime()),
            _ => Err(impossible(dst_ty, src_ty)),
        }
    }

    fn to_struct(
        &self,
        dst_ty: &'static TypeInfo,
        src_ty: &'static TypeInfo,
        layout: &'static StructInfo,
    ) -> Result<Procedure, ConvertError> {
        match src_ty.kind() {
            Kind::Struct(src_layout) => self.struct_to_struct(dst_ty, layout, src_layout),
            Kind::Map { key, value } if matches!(key().kind(), Kind::String) => {
                self.map_to_struct(dst_ty, layout, value())
            }
            Kind::Dynamic => Ok(runtime()),
            _ => Err(impossible(dst_ty, src_ty)),
        }
    }

    fn struct_to_struct(
        &self,
        dst_ty: &'static TypeInfo,
        layout: &'static StructInfo,
        src_layout: &'static StructInfo,
    ) -> Result<Procedure, ConvertError> {
        let sources: HashMap<&str, (usize, &'static TypeInfo)> = src_layout
            .resolved()
            .filter_map(|(idx, name, field)| field.type_info().map(|ty| (name, (idx, ty))))
            .collect();
        let validators = self.struct_validators(dst_ty)?;

        let mut bindings = Vec::new();
        for (target, name, field) in layout.resolved() {
            let (Some(&(source, src_field_ty)), Some(field_ty)) =
                (sources.get(name), field.type_info())
            else {
                continue;
            };
            let convert = self
                .resolve(field_ty, src_field_ty)
                .map_err(|e| e.with_field(field.name))?;
            bindings.push((
                source,
                FieldBinding {
                    name: field.name,
                    target,
                    convert,
                    validators: validators_for(&validators, target),
                },
            ));
        }

        let dst_name = dst_ty.name();
        Ok(procedure(move |engine, dst, src| {
            let ReflectRef::Struct(from) = src.reflect_ref() else {
                return Err(shape(dst_name));
            };
            let ReflectMut::Struct(into) = dst.reflect_mut() else {
                return Err(shape(dst_name));
            };
            for (source, binding) in &bindings {
                let value = from.field(*source).ok_or(shape(dst_name))?;
                binding.apply(engine, into, value, dst_name)?;
            }
            Ok(())
        }))
    }

    fn map_to_struct(
        &self,
        dst_ty: &'static TypeInfo,
        layout: &'static StructInfo,
        value_ty: &'static TypeInfo,
    ) -> Result<Procedure, ConvertError> {
        let validators = self.struct_validators(dst_ty)?;

        let mut bindings = Vec::new();
        let mut by_name: HashMap<&'static str, usize> = HashMap::new();
        for (target, name, field) in layout.resolved() {
            let Some(field_ty) = field.type_info() else {
                continue;
            };
            let convert = self
                .resolve(field_ty, value_ty)
                .map_err(|e| e.with_field(field.name))?;
            by_name.insert(name, bindings.len());
            bindings.push(FieldBinding {
                name: field.name,
                target,
                convert,
                validators: validators_for(&validators, target),
            });
        }

        let dst_name = dst_ty.name();
        Ok(procedure(move |engine, dst, src| {
            let ReflectRef::Map(entries) = src.reflect_ref() else {
                return Err(shape(dst_name));
            };
            let ReflectMut::Struct(into) = dst.reflect_mut() else {
                return Err(shape(dst_name));
            };
            let matched = entries.iter().filter_map(|(key, value)| match key.reflect_ref() {
                ReflectRef::Str(name) => by_name.get(name).map(|&idx| (idx, value)),
                _ => None,
            });
            match engine.config().map_field_order {
                MapFieldOrder::Source => {
                    for (idx, value) in matched {
                        bindings[idx].apply(engine, into, value, dst_name)?;
                    }
                }
                MapFieldOrder::Declared => {
                    let mut ordered: Vec<_> = matched.collect();
                    ordered.sort_by_key(|(idx, _)| *idx);
                    for (idx, value) in ordered {
                        bindings[idx].apply(engine, into, value, dst_name)?;
                    }
                }
            }
            Ok(())
        }))
    }
}

// ════════════════════════════════════════════════════════════════
//  Leaf procedures
// ════════════════════════════════════════════════════════════════

fn identity() -> Procedure {
    static IDENTITY: OnceLock<Procedure> = OnceLock::new();
    IDENTITY
        .get_or_init(|| {
            procedure(|_, dst, src| {
                let info = dst.type_of();
                if info.copy_into(dst, src) {
                    Ok(())
                } else {
                    Err(shape(info.name()))
                }
            })
        })
        .clone()
}

/// Defer to the payload of a dynamic source.
fn runtime() -> Procedure {
    procedure(|engine, dst, src| match src.reflect_ref() {
        ReflectRef::Dynamic(Some(inner)) => engine.dispatch(dst, inner),
        _ => Err(ConvertError::InvalidSource),
    })
}

fn store_value(dst: &mut dyn Reflect, value: Value) -> Result<(), ConvertError> {
    let name = dst.type_of().name();
    match dst.reflect_mut() {
        ReflectMut::Dynamic(slot) => {
            *slot = value;
            Ok(())
        }
        _ => Err(shape(name)),
    }
}

fn scalar_to_value() -> Procedure {
    procedure(|_, dst, src| {
        let value = match src.reflect_ref() {
            ReflectRef::Bool(b) => Value::Bool(b),
            ReflectRef::Number(n) => Value::from(n),
            ReflectRef::Str(s) => Value::String(s.to_owned()),
            ReflectRef::Bytes(b) => Value::Bytes(b.to_vec()),
            _ => return Err(shape(src.type_of().name())),
        };
        store_value(dst, value)
    })
}

fn scan_hook(dst_ty: &'static TypeInfo) -> Procedure {
    let dst_name = dst_ty.name();
    procedure(move |engine, dst, src| {
        let target = dst.as_scan_target().ok_or(shape(dst_name))?;
        target
            .scan(src)
            .map_err(|e| ConvertError::Hook(Arc::from(e)))?;
        engine.validate(dst)
    })
}

fn assign_to_hook(src_ty: &'static TypeInfo) -> Procedure {
    let src_name = src_ty.name();
    procedure(move |engine, dst, src| {
        let source = src.as_assign_source().ok_or(shape(src_name))?;
        source.assign_to(engine, dst)?;
        engine.validate(dst)
    })
}

fn to_string(dst_ty: &'static TypeInfo, src_ty: &'static TypeInfo) -> Procedure {
    let dst_name = dst_ty.name();
    if matches!(src_ty.kind(), Kind::Bytes) {
        return procedure(move |_, dst, src| {
            let ReflectRef::Bytes(bytes) = src.reflect_ref() else {
                return Err(shape(dst_name));
            };
            let ReflectMut::Str(out) = dst.reflect_mut() else {
                return Err(shape(dst_name));
            };
            *out = STANDARD.encode(bytes);
            Ok(())
        });
    }
    procedure(move |_, dst, src| {
        let (text, ok) = coerce::to_string(src);
        if !ok {
            return Err(ConvertError::Coerce {
                src: src.type_of().name(),
                dst: dst_name,
            });
        }
        let ReflectMut::Str(out) = dst.reflect_mut() else {
            return Err(shape(dst_name));
        };
        *out = text;
        Ok(())
    })
}

fn to_bool(dst_ty: &'static TypeInfo) -> Procedure {
    let dst_name = dst_ty.name();
    procedure(move |_, dst, src| {
        let ReflectMut::Bool(out) = dst.reflect_mut() else {
            return Err(shape(dst_name));
        };
        *out = coerce::to_bool(src);
        Ok(())
    })
}

/// Integer sources keep their full range; everything else goes through
/// the coercion primitives.
fn to_number(kind: NumberKind) -> Procedure {
    procedure(move |engine, dst, src| {
        let policy = engine.config().overflow;
        let dst_name = dst.type_of().name();
        let coerce_error = || ConvertError::Coerce {
            src: src.type_of().name(),
            dst: dst_name,
        };

        let integer = coerce::to_number(src).filter(|n| !n.kind().is_float());
        let ReflectMut::Number(slot) = dst.reflect_mut() else {
            return Err(shape(dst_name));
        };
        let fits = if kind.is_float() {
            let (v, ok) = coerce::to_f64(src);
            if !ok {
                return Err(coerce_error());
            }
            slot.store_f64(v, policy)
        } else if let Some(n) = integer {
            match (n.signed(), n.unsigned()) {
                (Some(v), _) => slot.store_i64(v, policy),
                (None, Some(v)) => slot.store_u64(v, policy),
                (None, None) => return Err(coerce_error()),
            }
        } else if kind.is_signed() {
            let (v, ok) = coerce::to_i64(src);
            if !ok {
                return Err(coerce_error());
            }
            slot.store_i64(v, policy)
        } else {
            let (v, ok) = coerce::to_u64(src);
            if !ok {
                return Err(coerce_error());
            }
            slot.store_u64(v, policy)
        };

        if !fits {
            return Err(ConvertError::OutOfRange {
                value: coerce::to_string(src).0,
                dst: dst_name,
            });
        }
        Ok(())
    })
}

fn to_bytes(
    dst_ty: &'static TypeInfo,
    src_ty: &'static TypeInfo,
) -> Result<Procedure, ConvertError> {
    let dst_name = dst_ty.name();
    match src_ty.kind() {
        Kind::String => Ok(procedure(move |_, dst, src| {
            let ReflectRef::Str(text) = src.reflect_ref() else {
                return Err(shape(dst_name));
            };
            let decoded = STANDARD.decode(text)?;
            let ReflectMut::Bytes(out) = dst.reflect_mut() else {
                return Err(shape(dst_name));
            };
            *out = decoded;
            Ok(())
        })),
        Kind::Dynamic => Ok(runtime()),
        _ => Err(impossible(dst_ty, src_ty)),
    }
}
