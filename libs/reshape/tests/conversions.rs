use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use reshape::{
    AssignSource, BoxError, ConvertError, Engine, EngineConfig, ErrorKind, MapFieldOrder, RawJson,
    Reflect, ScanTarget, Value,
};

fn bare_engine() -> Engine {
    Engine::with_config(EngineConfig::default().without_std_validators())
}

// ════════════════════════════════════════════════════════════════
//  Fixtures
// ════════════════════════════════════════════════════════════════

#[derive(Reflect, Clone, Default, Debug, PartialEq)]
pub struct Person {
    #[reshape(rename = "Name")]
    pub name: String,
    #[reshape(rename = "Age")]
    pub age: i64,
}

#[derive(Reflect, Clone, Default, Debug, PartialEq)]
pub struct Plain {
    pub a: String,
    pub b: i64,
}

#[derive(Reflect, Clone, Default, Debug, PartialEq)]
pub struct Checked {
    pub a: String,
    #[reshape(validate = "minlength=8")]
    pub b: String,
}

#[derive(Reflect, Clone, Default, Debug, PartialEq)]
pub struct ListA {
    pub value: i64,
    pub next: Option<Box<ListA>>,
}

#[derive(Reflect, Clone, Default, Debug, PartialEq)]
pub struct ListB {
    pub value: String,
    pub next: Option<Box<ListB>>,
}

fn list_a(values: &[i64]) -> Option<Box<ListA>> {
    let (first, rest) = values.split_first()?;
    Some(Box::new(ListA {
        value: *first,
        next: list_a(rest),
    }))
}

fn collect_b(list: &ListB) -> Vec<String> {
    let mut out = vec![list.value.clone()];
    let mut cursor = list.next.as_deref();
    while let Some(node) = cursor {
        out.push(node.value.clone());
        cursor = node.next.as_deref();
    }
    out
}

/// Comma separated list, filled through the scan hook.
#[derive(Reflect, Clone, Default, Debug, PartialEq)]
#[reshape(scan, opaque)]
pub struct Tags(Vec<String>);

impl ScanTarget for Tags {
    fn scan(&mut self, src: &dyn Reflect) -> Result<(), BoxError> {
        let (text, ok) = reshape::coerce::to_string(src);
        if !ok {
            return Err(format!("cannot read tags from {}", src.type_of().name()).into());
        }
        self.0 = text.split(',').map(str::to_owned).collect();
        Ok(())
    }
}

/// Never reveals its content.
#[derive(Reflect, Clone, Default, Debug, PartialEq)]
#[reshape(assign_to, opaque)]
pub struct Secret(String);

impl AssignSource for Secret {
    fn assign_to(&self, engine: &Engine, dst: &mut dyn Reflect) -> Result<(), ConvertError> {
        engine.assign(dst, &"***".to_string())
    }
}

// ════════════════════════════════════════════════════════════════
//  Scalars
// ════════════════════════════════════════════════════════════════

#[test]
fn string_to_integer() {
    let n: i64 = reshape::convert(&"42".to_string()).unwrap();
    assert_eq!(n, 42);
}

#[test]
fn float_to_integer_rounds_half_away_from_zero() {
    assert_eq!(reshape::convert::<i64>(&42.5f64).unwrap(), 43);
    assert_eq!(reshape::convert::<i64>(&-42.5f64).unwrap(), -43);
    assert_eq!(reshape::convert::<u16>(&Value::Float(1.4)).unwrap(), 1);
}

#[test]
fn base64_between_bytes_and_strings() {
    let bytes: Vec<u8> = reshape::convert(&"aGVsbG8=".to_string()).unwrap();
    assert_eq!(bytes, b"hello".to_vec());
    let text: String = reshape::convert(&b"hello".to_vec()).unwrap();
    assert_eq!(text, "aGVsbG8=");
}

#[test]
fn null_source_is_invalid() {
    let err = reshape::convert::<i64>(&Value::Null).unwrap_err();
    assert!(matches!(err, ConvertError::InvalidSource));
    assert_eq!(err.kind(), ErrorKind::Source);
}

#[test]
fn integer_overflow_is_reported() {
    let mut dst = Plain::default();
    let src: Value = [("a", Value::from("x")), ("b", Value::Uint(u64::MAX))]
        .into_iter()
        .collect();
    let err = reshape::assign(&mut dst, &src).unwrap_err();
    assert_eq!(err.field(), Some("b"));
    assert!(matches!(err.root(), ConvertError::OutOfRange { .. }));
}

// ════════════════════════════════════════════════════════════════
//  Collections
// ════════════════════════════════════════════════════════════════

#[test]
fn sequence_element_conversion() {
    let out: Vec<String> = reshape::convert(&vec![1i64, 2, 3]).unwrap();
    assert_eq!(out, vec!["1", "2", "3"]);
}

#[test]
fn dynamic_array_into_typed_sequence() {
    let src = Value::Array(vec![Value::from("1"), Value::Int(2), Value::Bool(true)]);
    let out: Vec<i32> = reshape::convert(&src).unwrap();
    assert_eq!(out, vec![1, 2, 1]);
}

#[test]
fn struct_into_map() {
    let src = Plain {
        a: "x".into(),
        b: 7,
    };
    let out: HashMap<String, Value> = reshape::convert(&src).unwrap();
    assert_eq!(out.len(), 2);
    assert_eq!(out["a"], Value::from("x"));
    assert_eq!(out["b"], Value::Int(7));

    let err = reshape::convert::<HashMap<i32, Value>>(&src).unwrap_err();
    assert!(matches!(err, ConvertError::Impossible { .. }));
}

#[test]
fn struct_into_dynamic_value_uses_resolved_names() {
    let src = Person {
        name: "ann".into(),
        age: 30,
    };
    let out: Value = reshape::convert(&src).unwrap();
    assert_eq!(out.get("Name"), Some(&Value::from("ann")));
    assert_eq!(out.get("Age"), Some(&Value::Int(30)));
    assert_eq!(out.get("name"), None);
}

// ════════════════════════════════════════════════════════════════
//  Structs
// ════════════════════════════════════════════════════════════════

#[test]
fn dynamic_map_into_struct_with_aliases() {
    let src: Value = [("Name", "ann"), ("Age", "30")].into_iter().collect();
    let person: Person = reshape::convert(&src).unwrap();
    assert_eq!(
        person,
        Person {
            name: "ann".into(),
            age: 30,
        }
    );
}

#[test]
fn alias_wins_over_declared_name() {
    #[derive(Reflect, Clone, Default, Debug, PartialEq)]
    pub struct Login {
        #[reshape(rename = "login")]
        pub name: String,
    }

    let src: BTreeMap<String, String> = [("name", "wrong"), ("login", "right")]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
    let out: Login = reshape::convert(&src).unwrap();
    assert_eq!(out.name, "right");
}

#[test]
fn unmatched_fields_are_left_alone() {
    #[derive(Reflect, Clone, Default, Debug, PartialEq)]
    pub struct Partial {
        pub a: String,
        pub extra: i64,
        #[reshape(skip)]
        pub b: i64,
        pub cache: Option<String>,
        secret: String,
        #[reshape(skip)]
        pub timeout: Duration,
    }

    let mut dst = Partial {
        extra: 3,
        secret: "keep".into(),
        ..Partial::default()
    };
    reshape::assign(
        &mut dst,
        &Plain {
            a: "x".into(),
            b: 9,
        },
    )
    .unwrap();
    assert_eq!(dst.a, "x");
    assert_eq!(dst.extra, 3);
    assert_eq!(dst.b, 0);
    assert_eq!(dst.secret, "keep");
}

#[test]
fn struct_to_struct_validates_converted_fields() {
    let src = Plain {
        a: "x".into(),
        b: 5,
    };
    let err = reshape::convert::<Checked>(&src).unwrap_err();
    assert_eq!(err.field(), Some("b"));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(matches!(err.root(), ConvertError::Validation(_)));
    assert_eq!(
        err.to_string(),
        "on field b: string must be at least 8 characters"
    );

    let src = Plain {
        a: "x".into(),
        b: 12_345_678,
    };
    let ok: Checked = reshape::convert(&src).unwrap();
    assert_eq!(ok.b, "12345678");
}

#[test]
fn self_referential_types_convert() {
    let src = ListA {
        value: 1,
        next: list_a(&[2, 3]),
    };
    let out: ListB = reshape::convert(&src).unwrap();
    assert_eq!(collect_b(&out), vec!["1", "2", "3"]);
}

#[test]
fn concurrent_first_use_of_a_pair() {
    let engine = Engine::new();
    let src = ListA {
        value: 10,
        next: list_a(&[20]),
    };

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| engine.convert::<ListB>(&src)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for result in results {
        assert_eq!(collect_b(&result.unwrap()), vec!["10", "20"]);
    }
}

#[test]
fn generic_structs() {
    #[derive(Reflect, Clone, Default, Debug, PartialEq)]
    pub struct Wrapper<T> {
        pub inner: T,
    }

    let src = Wrapper { inner: 5u8 };
    let out: Wrapper<String> = reshape::convert(&src).unwrap();
    assert_eq!(out.inner, "5");
}

// ════════════════════════════════════════════════════════════════
//  Validators
// ════════════════════════════════════════════════════════════════

#[test]
fn first_failing_validator_stops_the_rest() {
    #[derive(Reflect, Clone, Default, Debug)]
    pub struct Guarded {
        #[reshape(validate = "always_fail,count")]
        pub a: String,
    }

    let engine = bare_engine();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    engine
        .validators()
        .register("always_fail", |_: String| Err::<(), _>("nope"));
    engine.validators().register("count", move |_: String| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, BoxError>(())
    });

    let src: Value = [("a", "x")].into_iter().collect();
    let err = engine.convert::<Guarded>(&src).unwrap_err();
    assert_eq!(err.to_string(), "on field a: nope");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn failing_field_skips_later_fields() {
    #[derive(Reflect, Clone, Default, Debug)]
    pub struct TwoChecks {
        #[reshape(validate = "reject")]
        pub a: String,
        #[reshape(validate = "count")]
        pub b: String,
    }

    let engine = Engine::with_config(
        EngineConfig::default()
            .without_std_validators()
            .with_map_field_order(MapFieldOrder::Declared),
    );
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    engine
        .validators()
        .register("reject", |_: String| Err::<(), _>("bad a"));
    engine.validators().register("count", move |_: String| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, BoxError>(())
    });

    let err = engine
        .convert::<TwoChecks>(&Plain {
            a: "x".into(),
            b: 1,
        })
        .unwrap_err();
    assert_eq!(err.field(), Some("a"));
    assert_eq!(err.to_string(), "on field a: bad a");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let src: Value = [("b", "y"), ("a", "x")].into_iter().collect();
    let err = engine.convert::<TwoChecks>(&src).unwrap_err();
    assert_eq!(err.field(), Some("a"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn unknown_validator_fails_synthesis() {
    #[derive(Reflect, Clone, Default, Debug)]
    pub struct Misspelled {
        #[reshape(validate = "not_emtpy")]
        pub a: String,
    }

    let err = reshape::convert::<Misspelled>(&Plain::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Synthesis);
    assert!(matches!(err.root(), ConvertError::UnknownValidator(name) if name == "not_emtpy"));
}

#[test]
fn in_place_validator_rewrites_the_field() {
    #[derive(Reflect, Clone, Default)]
    pub struct Shout {
        #[reshape(validate = "upper")]
        pub word: String,
    }

    let engine = bare_engine();
    engine.validators().register_mut("upper", |s: &mut String| {
        *s = s.to_uppercase();
        Ok::<_, BoxError>(())
    });

    let src: Value = [("word", "quiet")].into_iter().collect();
    let out: Shout = engine.convert(&src).unwrap();
    assert_eq!(out.word, "QUIET");
}

#[test]
fn standard_validators() {
    #[derive(Reflect, Clone, Default, Debug)]
    pub struct Profile {
        #[reshape(validate = "not_empty")]
        pub name: String,
        #[reshape(validate = "hex6color")]
        pub color: String,
        #[reshape(validate = "ip_address")]
        pub addr: String,
        #[reshape(validate = "maxlength=4")]
        pub code: String,
    }

    let src: Value = [
        ("name", "ann"),
        ("color", "#A1B2C3"),
        ("addr", "::1"),
        ("code", "ab"),
    ]
    .into_iter()
    .collect();
    let out: Profile = reshape::convert(&src).unwrap();
    assert_eq!(out.color, "A1B2C3");

    let src: Value = [("name", "")].into_iter().collect();
    let err = reshape::convert::<Profile>(&src).unwrap_err();
    assert_eq!(
        err.to_string(),
        "on field name: validator: value must not be empty"
    );

    let src: Value = [("addr", "300.1.1.1")].into_iter().collect();
    let err = reshape::convert::<Profile>(&src).unwrap_err();
    assert_eq!(err.field(), Some("addr"));
}

#[test]
fn explicit_validation() {
    #[derive(Reflect, Clone, Default, Debug)]
    pub struct Named {
        #[reshape(validate = "not_empty")]
        pub name: String,
    }

    let mut value = Named::default();
    let err = reshape::validate(&mut value).unwrap_err();
    assert_eq!(err.field(), Some("name"));

    value.name = "set".into();
    reshape::validate(&mut value).unwrap();

    let mut wrapped = Some(Named::default());
    assert!(reshape::validate(&mut wrapped).is_err());
    reshape::validate(&mut 5i64).unwrap();
}

#[test]
fn map_field_order_is_configurable() {
    #[derive(Reflect, Clone, Default)]
    pub struct Ordered {
        #[reshape(validate = "log")]
        pub z: String,
        #[reshape(validate = "log")]
        pub a: String,
    }

    let run = |order: MapFieldOrder| {
        let engine = Engine::with_config(
            EngineConfig::default()
                .without_std_validators()
                .with_map_field_order(order),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        engine.validators().register("log", move |s: String| {
            sink.lock().unwrap().push(s);
            Ok::<_, BoxError>(())
        });
        let src: Value = [("a", "first"), ("z", "last")].into_iter().collect();
        engine.convert::<Ordered>(&src).unwrap();
        let seen = seen.lock().unwrap().clone();
        seen
    };

    assert_eq!(run(MapFieldOrder::Declared), vec!["last", "first"]);
    assert_eq!(run(MapFieldOrder::Source), vec!["first", "last"]);
}

// ════════════════════════════════════════════════════════════════
//  Hooks
// ════════════════════════════════════════════════════════════════

#[test]
fn scan_hook_fills_destination() {
    #[derive(Reflect, Clone, Default, Debug, PartialEq)]
    pub struct Post {
        pub tags: Tags,
    }

    let tags: Tags = reshape::convert(&"a,b".to_string()).unwrap();
    assert_eq!(tags, Tags(vec!["a".into(), "b".into()]));

    let src: Value = [("tags", "x,y")].into_iter().collect();
    let post: Post = reshape::convert(&src).unwrap();
    assert_eq!(post.tags.0, vec!["x", "y"]);

    let err = reshape::convert::<Tags>(&Value::Array(vec![])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
}

#[test]
fn assign_to_hook_writes_destination() {
    let out: String = reshape::convert(&Secret("hunter2".into())).unwrap();
    assert_eq!(out, "***");
    let out: Value = reshape::convert(&Secret("hunter2".into())).unwrap();
    assert_eq!(out, Value::from("***"));
}

#[test]
fn hooks_apply_inside_rendered_values() {
    #[derive(Reflect, Clone, Default, Debug)]
    pub struct Doc {
        pub title: String,
        pub body: RawJson,
        pub owner: Option<Secret>,
    }

    let doc = Doc {
        title: "t".into(),
        body: RawJson::new("[1]"),
        owner: Some(Secret("ann".into())),
    };
    let out: Value = reshape::convert(&doc).unwrap();
    let expected: Value = [
        ("title", Value::from("t")),
        ("body", Value::Array(vec![Value::Int(1)])),
        ("owner", Value::from("***")),
    ]
    .into_iter()
    .collect();
    assert_eq!(out, expected);

    let out: Value = reshape::convert(&Some(Secret("ann".into()))).unwrap();
    assert_eq!(out, Value::from("***"));
    let out: Value = reshape::convert(&None::<Secret>).unwrap();
    assert_eq!(out, Value::Null);
}

#[test]
fn opaque_values_without_hooks_cannot_render() {
    #[derive(Reflect, Clone, Default, Debug)]
    #[reshape(opaque)]
    pub struct Handle(u32);

    #[derive(Reflect, Clone, Default, Debug)]
    pub struct Holder {
        pub handle: Handle,
    }

    let engine = bare_engine();
    let err = engine.convert::<Value>(&Holder::default()).unwrap_err();
    assert_eq!(err.field(), Some("handle"));
    assert!(matches!(err.root(), ConvertError::Impossible { .. }));
    assert!(engine.cache().is_empty());
}

#[test]
fn raw_json_in_both_directions() {
    let src = RawJson::new(r#"{"Name":"ann","Age":"30"}"#);
    let person: Person = reshape::convert(&src).unwrap();
    assert_eq!(person.age, 30);

    let value: Value = [("b", Value::Int(1)), ("a", Value::Bool(true))]
        .into_iter()
        .collect();
    let json: RawJson = reshape::convert(&value).unwrap();
    assert_eq!(json.as_str(), r#"{"a":true,"b":1}"#);

    let err = reshape::convert::<Person>(&RawJson::new("{")).unwrap_err();
    assert!(matches!(err, ConvertError::Json(_)));
}

// ════════════════════════════════════════════════════════════════
//  Properties
// ════════════════════════════════════════════════════════════════

#[test]
fn same_type_conversion_returns_an_equal_value() {
    let list = ListA {
        value: 1,
        next: list_a(&[2, 3]),
    };
    assert_eq!(reshape::convert::<ListA>(&list).unwrap(), list);

    let map: HashMap<String, Vec<Option<i32>>> =
        HashMap::from([("k".to_string(), vec![Some(1), None])]);
    assert_eq!(
        reshape::convert::<HashMap<String, Vec<Option<i32>>>>(&map).unwrap(),
        map
    );

    let value: Value = [("a", Value::Array(vec![Value::Uint(1), Value::Null]))]
        .into_iter()
        .collect();
    assert_eq!(reshape::convert::<Value>(&value).unwrap(), value);
}

proptest! {
    #[test]
    fn integers_survive_a_trip_through_strings(n in any::<i64>()) {
        let text: String = reshape::convert(&n).unwrap();
        let back: i64 = reshape::convert(&text).unwrap();
        prop_assert_eq!(back, n);
    }

    #[test]
    fn bytes_survive_a_trip_through_base64(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let text: String = reshape::convert(&bytes).unwrap();
        let back: Vec<u8> = reshape::convert(&text).unwrap();
        prop_assert_eq!(back, bytes);
    }

    #[test]
    fn same_type_conversion_is_identity(
        n in any::<i64>(),
        text in ".*",
        items in proptest::collection::vec(any::<i64>(), 0..16),
        maybe in proptest::option::of(any::<i64>()),
    ) {
        let same: i64 = reshape::convert(&n).unwrap();
        prop_assert_eq!(same, n);
        let same: String = reshape::convert(&text).unwrap();
        prop_assert_eq!(&same, &text);
        let same: Vec<i64> = reshape::convert(&items).unwrap();
        prop_assert_eq!(&same, &items);
        let same: Option<i64> = reshape::convert(&maybe).unwrap();
        prop_assert_eq!(same, maybe);

        let person = Person { name: text, age: n };
        let same: Person = reshape::convert(&person).unwrap();
        prop_assert_eq!(&same, &person);
    }

    #[test]
    fn narrowing_never_writes_silently(n in any::<i64>()) {
        let mut dst = 0i8;
        match reshape::assign(&mut dst, &n) {
            Ok(()) => prop_assert_eq!(i64::from(dst), n),
            Err(err) => prop_assert!(matches!(err, ConvertError::OutOfRange { .. }), "unexpected error: {err}"),
        }
    }
}
