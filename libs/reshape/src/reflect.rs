//! Type descriptors and runtime access.
//!
//! Every convertible type implements [`Reflect`] (object-safe, for values)
//! and [`Typed`] (static, for descriptors). The engine never inspects a
//! concrete type directly: it dispatches on [`Kind`] and reads or writes
//! through [`ReflectRef`] / [`ReflectMut`].

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::{OnceLock, RwLock};

use crate::config::OverflowPolicy;
use crate::engine::Engine;
use crate::error::{BoxError, ConvertError};
use crate::util;
use crate::value::Value;

/// Lazy reference to a descriptor. Allows self-referential types.
pub type TypeFn = fn() -> &'static TypeInfo;

// ════════════════════════════════════════════════════════════════
//  Descriptors
// ════════════════════════════════════════════════════════════════

/// Optional hooks a type exposes to the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// The type can populate itself from an arbitrary source.
    pub scan: bool,
    /// The type can write itself into an arbitrary destination.
    pub assign_to: bool,
}

/// Descriptor of a concrete type. Interned once per type, lives forever.
pub struct TypeInfo {
    id: TypeId,
    name: &'static str,
    kind: Kind,
    capabilities: Capabilities,
    copy: fn(&mut dyn Any, &dyn Any) -> bool,
    default: fn() -> Box<dyn Reflect>,
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

fn copy_value<T: Clone + 'static>(dst: &mut dyn Any, src: &dyn Any) -> bool {
    match (dst.downcast_mut::<T>(), src.downcast_ref::<T>()) {
        (Some(dst), Some(src)) => {
            dst.clone_from(src);
            true
        }
        _ => false,
    }
}

fn default_value<T: Reflect + Default>() -> Box<dyn Reflect> {
    Box::new(T::default())
}

impl TypeInfo {
    pub fn new<T: Reflect + Clone + Default>(kind: Kind) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            kind,
            capabilities: Capabilities::default(),
            copy: copy_value::<T>,
            default: default_value::<T>,
        }
    }

    pub fn with_scan(mut self) -> Self {
        self.capabilities.scan = true;
        self
    }

    pub fn with_assign_to(mut self) -> Self {
        self.capabilities.assign_to = true;
        self
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn struct_info(&self) -> Option<&StructInfo> {
        match &self.kind {
            Kind::Struct(info) => Some(info),
            _ => None,
        }
    }

    /// Number of pointer layers around the base type.
    pub fn pointer_depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let Kind::Pointer { pointee, .. } = current.kind {
            depth += 1;
            current = pointee();
        }
        depth
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self.kind, Kind::Pointer { nullable: true, .. })
    }

    /// Clone `src` into `dst`. Both must be values of this type.
    pub fn copy_into(&self, dst: &mut dyn Reflect, src: &dyn Reflect) -> bool {
        (self.copy)(dst.as_any_mut(), src.as_any())
    }

    pub fn new_default(&self) -> Box<dyn Reflect> {
        (self.default)()
    }
}

/// Look up the descriptor of `T`, building it on first use.
pub fn intern<T: 'static>(build: impl FnOnce() -> TypeInfo) -> &'static TypeInfo {
    static TYPES: OnceLock<RwLock<HashMap<TypeId, &'static TypeInfo>>> = OnceLock::new();

    let types = TYPES.get_or_init(Default::default);
    let id = TypeId::of::<T>();
    if let Some(info) = util::read(types, "type registry").get(&id).copied() {
        return info;
    }
    let info = build();
    *util::write(types, "type registry")
        .entry(id)
        .or_insert_with(|| Box::leak(Box::new(info)))
}

/// Closed set of shapes the engine knows how to convert.
#[derive(Debug, Clone)]
pub enum Kind {
    Bool,
    Number(NumberKind),
    String,
    /// `Vec<u8>`, kept apart from sequences.
    Bytes,
    Seq {
        elem: TypeFn,
    },
    Map {
        key: TypeFn,
        value: TypeFn,
    },
    Struct(StructInfo),
    /// `Option<T>` (nullable) or `Box<T>`.
    Pointer {
        pointee: TypeFn,
        nullable: bool,
    },
    /// [`Value`]: shape known only at runtime.
    Dynamic,
    /// Converts by identity or capability hooks only.
    Opaque,
}

// ════════════════════════════════════════════════════════════════
//  Struct layout
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: &'static str,
    pub rename: Option<&'static str>,
    pub skip: bool,
    pub public: bool,
    /// Raw validator annotation, e.g. `"minlength=8,not_empty"`.
    pub validate: Option<&'static str>,
    /// Absent for fields that never take part in conversion.
    pub ty: Option<TypeFn>,
}

impl FieldInfo {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rename: None,
            skip: false,
            public: true,
            validate: None,
            ty: None,
        }
    }

    pub fn typed(mut self, ty: TypeFn) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn renamed(mut self, alias: &'static str) -> Self {
        self.rename = Some(alias);
        self
    }

    pub fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }

    pub fn validated(mut self, annotation: &'static str) -> Self {
        self.validate = Some(annotation);
        self
    }

    /// Name used for matching: the alias if any, else the declared name.
    /// `None` when the field is excluded from conversion.
    pub fn resolved_name(&self) -> Option<&'static str> {
        if self.skip || !self.public || self.ty.is_none() {
            return None;
        }
        Some(self.rename.unwrap_or(self.name))
    }

    pub fn type_info(&self) -> Option<&'static TypeInfo> {
        self.ty.map(|ty| ty())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StructInfo {
    pub fields: Vec<FieldInfo>,
}

impl StructInfo {
    pub fn new(fields: Vec<FieldInfo>) -> Self {
        Self { fields }
    }

    /// Fields taking part in conversion, with their declaration index.
    pub fn resolved(&self) -> impl Iterator<Item = (usize, &'static str, &FieldInfo)> {
        self.fields
            .iter()
            .enumerate()
            .filter_map(|(idx, f)| f.resolved_name().map(|name| (idx, name, f)))
    }
}

// ════════════════════════════════════════════════════════════════
//  Numbers
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumberKind {
    I8,
    I16,
    I32,
    I64,
    Isize,
    U8,
    U16,
    U32,
    U64,
    Usize,
    F32,
    F64,
}

impl NumberKind {
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            NumberKind::I8 | NumberKind::I16 | NumberKind::I32 | NumberKind::I64 | NumberKind::Isize
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            NumberKind::U8 | NumberKind::U16 | NumberKind::U32 | NumberKind::U64 | NumberKind::Usize
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, NumberKind::F32 | NumberKind::F64)
    }
}

/// A primitive number read out of a value, keeping its width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Isize(isize),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Usize(usize),
    F32(f32),
    F64(f64),
}

macro_rules! number_dispatch {
    ($self:expr, $v:ident => $body:expr) => {
        match $self {
            Number::I8($v) => $body,
            Number::I16($v) => $body,
            Number::I32($v) => $body,
            Number::I64($v) => $body,
            Number::Isize($v) => $body,
            Number::U8($v) => $body,
            Number::U16($v) => $body,
            Number::U32($v) => $body,
            Number::U64($v) => $body,
            Number::Usize($v) => $body,
            Number::F32($v) => $body,
            Number::F64($v) => $body,
        }
    };
}

/// Round half away from zero; fails when the result does not fit `i64`.
fn round_to_i64(f: f64) -> (i64, bool) {
    let x = f.round();
    let fits = x >= i64::MIN as f64 && x < -(i64::MIN as f64);
    (x as i64, fits)
}

fn round_to_u64(f: f64) -> (u64, bool) {
    if f < 0.0 {
        return (0, false);
    }
    let x = f.round();
    let fits = x < u64::MAX as f64;
    (x as u64, fits)
}

impl Number {
    pub fn kind(&self) -> NumberKind {
        match self {
            Number::I8(_) => NumberKind::I8,
            Number::I16(_) => NumberKind::I16,
            Number::I32(_) => NumberKind::I32,
            Number::I64(_) => NumberKind::I64,
            Number::Isize(_) => NumberKind::Isize,
            Number::U8(_) => NumberKind::U8,
            Number::U16(_) => NumberKind::U16,
            Number::U32(_) => NumberKind::U32,
            Number::U64(_) => NumberKind::U64,
            Number::Usize(_) => NumberKind::Usize,
            Number::F32(_) => NumberKind::F32,
            Number::F64(_) => NumberKind::F64,
        }
    }

    /// Value of a signed integer, widened.
    pub fn signed(&self) -> Option<i64> {
        match *self {
            Number::I8(v) => Some(v.into()),
            Number::I16(v) => Some(v.into()),
            Number::I32(v) => Some(v.into()),
            Number::I64(v) => Some(v),
            Number::Isize(v) => Some(v as i64),
            _ => None,
        }
    }

    /// Value of an unsigned integer, widened.
    pub fn unsigned(&self) -> Option<u64> {
        match *self {
            Number::U8(v) => Some(v.into()),
            Number::U16(v) => Some(v.into()),
            Number::U32(v) => Some(v.into()),
            Number::U64(v) => Some(v),
            Number::Usize(v) => Some(v as u64),
            _ => None,
        }
    }

    pub fn float(&self) -> Option<f64> {
        match *self {
            Number::F32(v) => Some(v.into()),
            Number::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn to_f64(&self) -> f64 {
        number_dispatch!(*self, v => v as f64)
    }

    /// Signed view. The flag is false when the value had to wrap or round
    /// out of range.
    pub fn to_i64(&self) -> (i64, bool) {
        if let Some(v) = self.signed() {
            return (v, true);
        }
        if let Some(v) = self.unsigned() {
            return (v as i64, v <= i64::MAX as u64);
        }
        round_to_i64(self.to_f64())
    }

    /// Unsigned view. Negative integers wrap and report failure; negative
    /// floats yield zero.
    pub fn to_u64(&self) -> (u64, bool) {
        if let Some(v) = self.unsigned() {
            return (v, true);
        }
        if let Some(v) = self.signed() {
            return (v as u64, v >= 0);
        }
        round_to_u64(self.to_f64())
    }

    pub fn is_zero(&self) -> bool {
        match self.float() {
            Some(f) => f == 0.0,
            None => self.to_i64().0 == 0,
        }
    }

    /// Big-endian bytes at the number's own width.
    pub fn to_be_bytes(&self) -> Vec<u8> {
        number_dispatch!(*self, v => v.to_be_bytes().to_vec())
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        number_dispatch!(self, v => fmt::Display::fmt(v, f))
    }
}

/// Write access to a number of unknown width.
///
/// Every store reports whether the value fit. Under
/// [`OverflowPolicy::Wrap`] a non-fitting integer is still written,
/// truncated to the slot width.
pub trait NumberSlot {
    fn kind(&self) -> NumberKind;
    fn load(&self) -> Number;
    fn store_i64(&mut self, v: i64, policy: OverflowPolicy) -> bool;
    fn store_u64(&mut self, v: u64, policy: OverflowPolicy) -> bool;
    fn store_f64(&mut self, v: f64, policy: OverflowPolicy) -> bool;
}

macro_rules! int_slot {
    ($($t:ty => $variant:ident, $to:ident, $store:ident;)*) => {$(
        impl NumberSlot for $t {
            fn kind(&self) -> NumberKind {
                NumberKind::$variant
            }

            fn load(&self) -> Number {
                Number::$variant(*self)
            }

            fn store_i64(&mut self, v: i64, policy: OverflowPolicy) -> bool {
                match <$t>::try_from(v) {
                    Ok(n) => {
                        *self = n;
                        true
                    }
                    Err(_) => {
                        if policy == OverflowPolicy::Wrap {
                            *self = v as $t;
                        }
                        false
                    }
                }
            }

            fn store_u64(&mut self, v: u64, policy: OverflowPolicy) -> bool {
                match <$t>::try_from(v) {
                    Ok(n) => {
                        *self = n;
                        true
                    }
                    Err(_) => {
                        if policy == OverflowPolicy::Wrap {
                            *self = v as $t;
                        }
                        false
                    }
                }
            }

            fn store_f64(&mut self, v: f64, policy: OverflowPolicy) -> bool {
                let (n, ok) = Number::F64(v).$to();
                ok && self.$store(n, policy)
            }
        }
    )*};
}

int_slot! {
    i8 => I8, to_i64, store_i64;
    i16 => I16, to_i64, store_i64;
    i32 => I32, to_i64, store_i64;
    i64 => I64, to_i64, store_i64;
    isize => Isize, to_i64, store_i64;
    u8 => U8, to_u64, store_u64;
    u16 => U16, to_u64, store_u64;
    u32 => U32, to_u64, store_u64;
    u64 => U64, to_u64, store_u64;
    usize => Usize, to_u64, store_u64;
}

macro_rules! float_slot {
    ($($t:ty => $variant:ident;)*) => {$(
        impl NumberSlot for $t {
            fn kind(&self) -> NumberKind {
                NumberKind::$variant
            }

            fn load(&self) -> Number {
                Number::$variant(*self)
            }

            fn store_i64(&mut self, v: i64, _policy: OverflowPolicy) -> bool {
                *self = v as $t;
                true
            }

            fn store_u64(&mut self, v: u64, _policy: OverflowPolicy) -> bool {
                *self = v as $t;
                true
            }

            fn store_f64(&mut self, v: f64, _policy: OverflowPolicy) -> bool {
                *self = v as $t;
                true
            }
        }
    )*};
}

float_slot! {
    f32 => F32;
    f64 => F64;
}

// ════════════════════════════════════════════════════════════════
//  Reflect
// ════════════════════════════════════════════════════════════════

/// Object-safe runtime access to a convertible value.
pub trait Reflect: Any + Send + Sync {
    fn type_of(&self) -> &'static TypeInfo;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn reflect_ref(&self) -> ReflectRef<'_>;
    fn reflect_mut(&mut self) -> ReflectMut<'_>;

    fn as_scan_target(&mut self) -> Option<&mut dyn ScanTarget> {
        None
    }

    fn as_assign_source(&self) -> Option<&dyn AssignSource> {
        None
    }
}

/// Static side of [`Reflect`].
pub trait Typed: Reflect + Sized {
    fn type_info() -> &'static TypeInfo;
}

impl fmt::Debug for dyn Reflect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.type_of().name())
    }
}

/// Read view of a value.
pub enum ReflectRef<'a> {
    Bool(bool),
    Number(Number),
    Str(&'a str),
    Bytes(&'a [u8]),
    Seq(&'a dyn SeqAccess),
    Map(&'a dyn MapAccess),
    Struct(&'a dyn StructAccess),
    Pointer(Option<&'a dyn Reflect>),
    /// Payload of a dynamic value; `None` for null.
    Dynamic(Option<&'a dyn Reflect>),
    Opaque,
}

/// Write view of a value.
pub enum ReflectMut<'a> {
    Bool(&'a mut bool),
    Number(&'a mut dyn NumberSlot),
    Str(&'a mut String),
    Bytes(&'a mut Vec<u8>),
    Seq(&'a mut dyn SeqAccess),
    Map(&'a mut dyn MapAccess),
    Struct(&'a mut dyn StructAccess),
    Pointer(&'a mut dyn PointerAccess),
    Dynamic(&'a mut Value),
    Opaque,
}

pub trait SeqAccess {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Option<&dyn Reflect>;
    fn get_mut(&mut self, index: usize) -> Option<&mut dyn Reflect>;

    /// Replace the contents with `len` default elements.
    fn reset(&mut self, len: usize);
}

pub trait MapAccess {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&dyn Reflect, &dyn Reflect)> + '_>;
    fn clear(&mut self);

    /// Insert an entry built from the map's own key and value types.
    /// Returns false when either box holds another type.
    fn insert(&mut self, key: Box<dyn Reflect>, value: Box<dyn Reflect>) -> bool;
}

pub trait StructAccess {
    fn field(&self, index: usize) -> Option<&dyn Reflect>;
    fn field_mut(&mut self, index: usize) -> Option<&mut dyn Reflect>;
}

pub trait PointerAccess {
    fn get(&self) -> Option<&dyn Reflect>;
    fn get_mut(&mut self) -> Option<&mut dyn Reflect>;
    /// The pointee, allocated with its default value when absent.
    fn get_or_alloc(&mut self) -> &mut dyn Reflect;
    fn clear(&mut self);
}

/// Capability: populate `self` from any source value.
pub trait ScanTarget {
    fn scan(&mut self, src: &dyn Reflect) -> Result<(), BoxError>;
}

/// Capability: write `self` into any destination.
///
/// Implementations may call back into the engine, but must not ask it to
/// convert `Self` again.
pub trait AssignSource {
    fn assign_to(&self, engine: &Engine, dst: &mut dyn Reflect) -> Result<(), ConvertError>;
}

/// Implements the boilerplate half of [`Reflect`] for a type that already
/// implements [`Typed`].
#[macro_export]
macro_rules! reflect_any {
    () => {
        fn type_of(&self) -> &'static $crate::reflect::TypeInfo {
            <Self as $crate::reflect::Typed>::type_info()
        }

        fn as_any(&self) -> &dyn ::std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
            self
        }

        fn into_any(self: Box<Self>) -> Box<dyn ::std::any::Any> {
            self
        }
    };
}

// ════════════════════════════════════════════════════════════════
//  Built-in types
// ════════════════════════════════════════════════════════════════

impl Typed for bool {
    fn type_info() -> &'static TypeInfo {
        intern::<Self>(|| TypeInfo::new::<Self>(Kind::Bool))
    }
}

impl Reflect for bool {
    reflect_any!();

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Bool(*self)
    }

    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        ReflectMut::Bool(self)
    }
}

macro_rules! reflect_number {
    ($($t:ty => $variant:ident),* $(,)?) => {$(
        impl Typed for $t {
            fn type_info() -> &'static TypeInfo {
                intern::<Self>(|| TypeInfo::new::<Self>(Kind::Number(NumberKind::$variant)))
            }
        }

        impl Reflect for $t {
            reflect_any!();

            fn reflect_ref(&self) -> ReflectRef<'_> {
                ReflectRef::Number(Number::$variant(*self))
            }

            fn reflect_mut(&mut self) -> ReflectMut<'_> {
                ReflectMut::Number(self)
            }
        }
    )*};
}

reflect_number! {
    i8 => I8, i16 => I16, i32 => I32, i64 => I64, isize => Isize,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64, usize => Usize,
    f32 => F32, f64 => F64,
}

impl Typed for String {
    fn type_info() -> &'static TypeInfo {
        intern::<Self>(|| TypeInfo::new::<Self>(Kind::String))
    }
}

impl Reflect for String {
    reflect_any!();

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Str(self)
    }

    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        ReflectMut::Str(self)
    }
}

// ── Vec ──────────────────────────────────────────────────────────

impl<T: Typed + Clone + Default> Typed for Vec<T> {
    fn type_info() -> &'static TypeInfo {
        intern::<Self>(|| {
            let kind = if TypeId::of::<T>() == TypeId::of::<u8>() {
                Kind::Bytes
            } else {
                Kind::Seq { elem: T::type_info }
            };
            TypeInfo::new::<Self>(kind)
        })
    }
}

impl<T: Typed + Clone + Default> Reflect for Vec<T> {
    reflect_any!();

    fn reflect_ref(&self) -> ReflectRef<'_> {
        match (self as &dyn Any).downcast_ref::<Vec<u8>>() {
            Some(bytes) => ReflectRef::Bytes(bytes),
            None => ReflectRef::Seq(self),
        }
    }

    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        if TypeId::of::<T>() == TypeId::of::<u8>() {
            return match (self as &mut dyn Any).downcast_mut::<Vec<u8>>() {
                Some(bytes) => ReflectMut::Bytes(bytes),
                None => ReflectMut::Opaque,
            };
        }
        ReflectMut::Seq(self)
    }
}

impl<T: Typed + Clone + Default> SeqAccess for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn get(&self, index: usize) -> Option<&dyn Reflect> {
        self.as_slice().get(index).map(|v| v as &dyn Reflect)
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut dyn Reflect> {
        self.as_mut_slice()
            .get_mut(index)
            .map(|v| v as &mut dyn Reflect)
    }

    fn reset(&mut self, len: usize) {
        Vec::clear(self);
        self.resize_with(len, T::default);
    }
}

// ── Maps ─────────────────────────────────────────────────────────

macro_rules! reflect_map {
    ($map:ident, $($bound:path),+) => {
        impl<K, V> Typed for $map<K, V>
        where
            K: Typed + Clone + Default $(+ $bound)+,
            V: Typed + Clone + Default,
        {
            fn type_info() -> &'static TypeInfo {
                intern::<Self>(|| {
                    TypeInfo::new::<Self>(Kind::Map {
                        key: K::type_info,
                        value: V::type_info,
                    })
                })
            }
        }

        impl<K, V> Reflect for $map<K, V>
        where
            K: Typed + Clone + Default $(+ $bound)+,
            V: Typed + Clone + Default,
        {
            reflect_any!();

            fn reflect_ref(&self) -> ReflectRef<'_> {
                ReflectRef::Map(self)
            }

            fn reflect_mut(&mut self) -> ReflectMut<'_> {
                ReflectMut::Map(self)
            }
        }

        impl<K, V> MapAccess for $map<K, V>
        where
            K: Typed + Clone + Default $(+ $bound)+,
            V: Typed + Clone + Default,
        {
            fn len(&self) -> usize {
                $map::len(self)
            }

            fn iter(&self) -> Box<dyn Iterator<Item = (&dyn Reflect, &dyn Reflect)> + '_> {
                Box::new($map::iter(self).map(|(k, v)| (k as &dyn Reflect, v as &dyn Reflect)))
            }

            fn clear(&mut self) {
                $map::clear(self);
            }

            fn insert(&mut self, key: Box<dyn Reflect>, value: Box<dyn Reflect>) -> bool {
                match (key.into_any().downcast::<K>(), value.into_any().downcast::<V>()) {
                    (Ok(k), Ok(v)) => {
                        $map::insert(self, *k, *v);
                        true
                    }
                    _ => false,
                }
            }
        }
    };
}

reflect_map!(HashMap, Eq, Hash);
reflect_map!(BTreeMap, Ord);

// ── Pointers ─────────────────────────────────────────────────────

impl<T: Typed + Clone + Default> Typed for Option<T> {
    fn type_info() -> &'static TypeInfo {
        intern::<Self>(|| {
            TypeInfo::new::<Self>(Kind::Pointer {
                pointee: T::type_info,
                nullable: true,
            })
        })
    }
}

impl<T: Typed + Clone + Default> Reflect for Option<T> {
    reflect_any!();

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Pointer(self.as_ref().map(|v| v as &dyn Reflect))
    }

    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        ReflectMut::Pointer(self)
    }
}

impl<T: Typed + Clone + Default> PointerAccess for Option<T> {
    fn get(&self) -> Option<&dyn Reflect> {
        self.as_ref().map(|v| v as &dyn Reflect)
    }

    fn get_mut(&mut self) -> Option<&mut dyn Reflect> {
        self.as_mut().map(|v| v as &mut dyn Reflect)
    }

    fn get_or_alloc(&mut self) -> &mut dyn Reflect {
        self.get_or_insert_with(T::default)
    }

    fn clear(&mut self) {
        *self = None;
    }
}

impl<T: Typed + Clone + Default> Typed for Box<T> {
    fn type_info() -> &'static TypeInfo {
        intern::<Self>(|| {
            TypeInfo::new::<Self>(Kind::Pointer {
                pointee: T::type_info,
                nullable: false,
            })
        })
    }
}

impl<T: Typed + Clone + Default> Reflect for Box<T> {
    reflect_any!();

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Pointer(Some(&**self))
    }

    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        ReflectMut::Pointer(self)
    }
}

impl<T: Typed + Clone + Default> PointerAccess for Box<T> {
    fn get(&self) -> Option<&dyn Reflect> {
        Some(&**self)
    }

    fn get_mut(&mut self) -> Option<&mut dyn Reflect> {
        Some(&mut **self)
    }

    fn get_or_alloc(&mut self) -> &mut dyn Reflect {
        &mut **self
    }

    fn clear(&mut self) {
        **self = T::default();
    }
}
