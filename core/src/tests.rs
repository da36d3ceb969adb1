#![cfg(test)]

use crate::{
    downcast, Annotations, Binding, Constraint, Contribution, DispatchKey, Error, Fields, Format,
    FormatTags, Handler, JsonMapping, MapFrom, MapTo, Mapped, Mapper, Policy, Reflect, Result,
    Target, TypeHierarchy, TypeIdHandling, TypeIds, TypeKey, TypeSpec, Value,
};
use chrono::{DateTime, TimeZone, Utc};
use futures::executor::block_on;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate as object_mapping;

fn json(text: &str) -> Value {
    serde_json::from_str(text).unwrap()
}

fn write(mapper: &Mapper, object: &dyn Reflect) -> Value {
    mapper
        .map_from(object, &Format::JSON)
        .unwrap()
        .ready()
        .unwrap()
}

#[derive(Debug, Default, PartialEq, Mapped)]
struct Address {
    street: String,
    number: u32,
}

#[derive(Debug, Default, PartialEq, Mapped)]
struct Person {
    name: String,
    age: u8,
    address: Address,
    tags: Vec<String>,
    nickname: Option<String>,
    #[mapped(skip)]
    cache: usize,
}

fn person() -> Person {
    Person {
        name: "Ann".to_owned(),
        age: 42,
        address: Address {
            street: "Main".to_owned(),
            number: 7,
        },
        tags: vec!["a".to_owned(), "b".to_owned()],
        nickname: None,
        cache: 13,
    }
}

pub trait Request {}

#[derive(Debug, Default, PartialEq, Mapped)]
struct GetDetails {
    id: i32,
}

#[derive(Debug, Default, PartialEq, Mapped)]
struct CreateDetails {
    id: i32,
    name: String,
}

#[derive(Debug, Default, PartialEq, Mapped)]
struct CreateDetails2 {
    id: i32,
    name: String,
    priority: u8,
}

fn register_requests() {
    TypeHierarchy::extend::<GetDetails, dyn Request>().unwrap();
    TypeHierarchy::extend::<CreateDetails, dyn Request>().unwrap();
    TypeHierarchy::extend::<CreateDetails2, CreateDetails>().unwrap();
    TypeIds::register::<GetDetails>().unwrap();
    TypeIds::register_named::<CreateDetails>("Create Details").unwrap();
}

#[test]
fn test_primitives() {
    let mapper = Mapper::default();
    assert_eq!(write(&mapper, &42i32), Value::from(42));
    assert_eq!(write(&mapper, &true), Value::from(true));
    assert_eq!(write(&mapper, &"hello".to_owned()), Value::from("hello"));
    assert_eq!(write(&mapper, &Some(1.5f64)), Value::from(1.5));
    assert_eq!(
        mapper
            .map_to_type::<i32>(&Value::from(42), &Format::JSON)
            .unwrap(),
        42
    );
    assert_eq!(
        mapper
            .map_to_type::<char>(&Value::from("x"), &Format::JSON)
            .unwrap(),
        'x'
    );
    assert_eq!(
        mapper
            .map_to_type::<Option<String>>(&Value::from("text"), &Format::JSON)
            .unwrap(),
        Some("text".to_owned())
    );
    assert!(matches!(
        mapper.map_to_type::<u8>(&Value::from("text"), &Format::JSON),
        Err(Error::Message(_))
    ));
}

#[test]
fn test_missing_input() {
    let mapper = Mapper::default();
    assert!(matches!(
        mapper.map_from(&Option::<i32>::None, &Format::JSON),
        Err(Error::MissingSubject)
    ));
    assert!(matches!(
        mapper.map_from(&Value::Null, &Format::JSON),
        Err(Error::MissingSubject)
    ));
    assert!(matches!(
        mapper.map_to(&Value::Null, &Format::JSON, None),
        Err(Error::MissingValue)
    ));
}

#[test]
fn test_struct() {
    let mapper = Mapper::default();
    let mut person = person();
    let value = write(&mapper, &person);
    assert_eq!(
        value,
        json(r#"{"name":"Ann","age":42,"address":{"street":"Main","number":7},"tags":["a","b"]}"#)
    );
    assert_eq!(
        serde_json::to_string(&value).unwrap(),
        r#"{"name":"Ann","age":42,"address":{"street":"Main","number":7},"tags":["a","b"]}"#
    );
    let restored = mapper.map_to_type::<Person>(&value, &Format::JSON).unwrap();
    person.cache = 0;
    assert_eq!(restored, person);

    person.nickname = Some("Annie".to_owned());
    let value = write(&mapper, &person);
    assert_eq!(value.get("nickname"), Some(&Value::from("Annie")));
    let restored = mapper.map_to_type::<Person>(&value, &Format::JSON).unwrap();
    assert_eq!(restored, person);

    let value = json(r#"{"name":"Bob","nickname":null,"unknown":1}"#);
    let restored = mapper.map_to_type::<Person>(&value, &Format::JSON).unwrap();
    assert_eq!(restored.name, "Bob");
    assert_eq!(restored.nickname, None);
    assert_eq!(restored.address, Address::default());
}

#[test]
fn test_populate_instance() {
    let mapper = Mapper::default();
    let instance = Person {
        age: 30,
        ..Default::default()
    };
    let result = mapper
        .map_to(
            &json(r#"{"name":"Zed"}"#),
            &Format::JSON,
            Some(Target::instance(instance)),
        )
        .unwrap()
        .ready()
        .unwrap();
    let result = downcast::<Person>(result).unwrap();
    assert_eq!(result.name, "Zed");
    assert_eq!(result.age, 30);
}

#[derive(Debug, Default, Mapped)]
struct Slot {
    content: Option<Value>,
}

#[test]
fn test_nested_null() {
    let mapper = Mapper::default();
    let slot = Slot {
        content: Some(Value::Null),
    };
    assert_eq!(write(&mapper, &slot), json(r#"{"content":null}"#));
    assert_eq!(
        write(&mapper, &vec![Some(Value::Null), Some(Value::from(1))]),
        json("[null,1]")
    );
    let restored = mapper
        .map_to_type::<Slot>(&json(r#"{"content":null}"#), &Format::JSON)
        .unwrap();
    assert_eq!(restored.content, None);
}

#[derive(Debug, Default, PartialEq, Mapped)]
struct IgnoredChild {
    secret: String,
}

#[derive(Debug, Default, PartialEq, Mapped)]
struct IgnoredParent {
    id: i32,
    child: IgnoredChild,
}

#[test]
fn test_ignore() {
    Annotations::ignore::<IgnoredChild>("secret").unwrap();
    let mapper = Mapper::default();
    let parent = IgnoredParent {
        id: 5,
        child: IgnoredChild {
            secret: "hidden".to_owned(),
        },
    };
    assert_eq!(write(&mapper, &parent), json(r#"{"id":5,"child":{}}"#));
    let restored = mapper
        .map_to_type::<IgnoredParent>(
            &json(r#"{"id":5,"child":{"secret":"leaked"}}"#),
            &Format::JSON,
        )
        .unwrap();
    assert_eq!(restored.id, 5);
    assert_eq!(restored.child.secret, "");
}

#[derive(Debug, Default, PartialEq, Mapped)]
struct Audit {
    created_by: String,
    revision: u32,
}

#[derive(Debug, Default, PartialEq, Mapped)]
struct Document {
    title: String,
    audit: Audit,
}

#[test]
fn test_root() {
    Annotations::root::<Document>("audit").unwrap();
    assert!(Annotations::is_root(TypeKey::of::<Document>(), "audit"));
    let mapper = Mapper::default();
    let document = Document {
        title: "Report".to_owned(),
        audit: Audit {
            created_by: "me".to_owned(),
            revision: 3,
        },
    };
    let value = write(&mapper, &document);
    assert_eq!(
        value,
        json(r#"{"title":"Report","created_by":"me","revision":3}"#)
    );
    let restored = mapper.map_to_type::<Document>(&value, &Format::JSON).unwrap();
    assert_eq!(restored, document);
}

#[test]
fn test_untyped() {
    let mapper = Mapper::default();
    let value = json(r#"[1,"a",true]"#);
    let object = mapper
        .map_to(&value, &Format::JSON, None)
        .unwrap()
        .ready()
        .unwrap();
    assert_eq!(write(&mapper, &*object), value);
    let items = downcast::<Vec<Box<dyn Reflect>>>(object).unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[1].downcast_ref::<Value>(), Some(&Value::from("a")));

    let value = json(r#"{"a":{"b":[1,null]},"c":"d"}"#);
    let object = mapper
        .map_to(&value, &Format::JSON, None)
        .unwrap()
        .ready()
        .unwrap();
    assert_eq!(object.downcast_ref::<Value>(), Some(&value));
    assert_eq!(write(&mapper, &*object), value);
}

#[test]
fn test_type_ids() {
    register_requests();
    let mapper = Mapper::default();
    let spec = mapper.get_type_from_id("GetDetails").unwrap();
    assert_eq!(spec.key(), TypeKey::of::<GetDetails>());
    let spec = mapper.get_type_from_id(" Create Details ").unwrap();
    assert_eq!(spec.key(), TypeKey::of::<CreateDetails>());
    assert_eq!(
        TypeIds::id_of_type(TypeKey::of::<CreateDetails>()).as_deref(),
        Some("CreateDetails")
    );

    let error = mapper.get_type_from_id("UpdateDetails").unwrap_err();
    assert!(error.is_not_handled());
    assert!(error.to_string().contains("UpdateDetails not handled"));
    assert!(TypeIds::resolve("UpdateDetails").is_none());
    assert!(matches!(
        mapper.get_type_from_id(22),
        Err(Error::InvalidTypeId(_))
    ));

    assert_eq!(
        TypeIds::register::<GetDetails>().unwrap(),
        "GetDetails".to_owned()
    );
    assert!(matches!(
        TypeIds::register_named::<GetDetails>("Other"),
        Err(Error::TypeIdAlreadyAssigned(..))
    ));
    assert!(matches!(
        TypeIds::infer(TypeKey::of::<Vec<i32>>()),
        Err(Error::TypeIdNotInferable(_))
    ));
    assert!(matches!(
        TypeIds::infer(TypeKey::of::<dyn Request>()),
        Err(Error::TypeIdNotInferable(_))
    ));
}

#[derive(Debug, Default, Mapped)]
struct CollidingA {
    id: i32,
}

#[derive(Debug, Default, Mapped)]
struct CollidingB {
    id: i32,
}

#[test]
fn test_type_id_collision() {
    TypeIds::register_named::<CollidingA>("Colliding Id").unwrap();
    assert!(matches!(
        TypeIds::register_named::<CollidingB>("CollidingId"),
        Err(Error::DuplicateTypeId(..))
    ));
    assert!(!TypeIds::is_registered::<CollidingB>());
    assert!(matches!(
        TypeIds::register_spec(CollidingB::type_spec(), Some("CollidingId"), Some("kind")),
        Err(Error::DuplicateTypeId(..))
    ));
    assert_eq!(TypeIds::property_of(TypeKey::of::<CollidingB>()), "$type");
    assert!(matches!(
        TypeIds::register_spec(CollidingA::type_spec(), Some("Other Id"), Some("kind")),
        Err(Error::TypeIdAlreadyAssigned(..))
    ));
    assert_eq!(TypeIds::property_of(TypeKey::of::<CollidingA>()), "$type");
    assert_eq!(
        TypeIds::resolve("C olliding Id").map(|spec| spec.key()),
        Some(TypeKey::of::<CollidingA>())
    );
}

#[test]
fn test_polymorphic() {
    register_requests();
    let mapper = Mapper::default();
    let target = || Some(Target::Type(TypeSpec::abstract_of::<dyn Request>()));
    let object = mapper
        .map_to(
            &json(r#"{"$type":"CreateDetails","id":7,"name":"new"}"#),
            &Format::JSON,
            target(),
        )
        .unwrap()
        .ready()
        .unwrap();
    let details = downcast::<CreateDetails>(object).unwrap();
    assert_eq!(details.id, 7);
    assert_eq!(details.name, "new");

    let object = mapper
        .map_to(
            &json(r#"{"$type":"GetDetails","id":1}"#),
            &Format::JSON,
            target(),
        )
        .unwrap()
        .ready()
        .unwrap();
    assert!(object.is::<GetDetails>());

    let object = mapper
        .map_to(&json(r#"{"id":1}"#), &Format::JSON, target())
        .unwrap()
        .ready()
        .unwrap();
    assert_eq!(object.downcast_ref::<Value>(), Some(&json(r#"{"id":1}"#)));

    let details = CreateDetails2 {
        id: 8,
        name: "derived".to_owned(),
        priority: 1,
    };
    let value = mapper
        .map_from_with(&details, &Format::JSON, |request| {
            request.set_type_id_handling(TypeIdHandling::Always);
        })
        .unwrap()
        .ready()
        .unwrap();
    assert_eq!(value.get("$type"), Some(&Value::from("CreateDetails")));
    assert_eq!(value.keys().next(), Some("$type"));
}

#[test]
fn test_polymorphic_mismatch() {
    register_requests();
    let mapper = Mapper::default();
    let value = json(r#"{"$type":"GetDetails","id":1}"#);
    assert!(matches!(
        mapper.map_to(
            &value,
            &Format::JSON,
            Some(Target::instance(Address::default()))
        ),
        Err(Error::TypeMismatch { .. })
    ));
    assert!(matches!(
        mapper.map_to_type::<Address>(&value, &Format::JSON),
        Err(Error::TypeMismatch { .. })
    ));
    let details = mapper
        .map_to_type::<CreateDetails>(
            &json(r#"{"$type":"CreateDetails","id":3}"#),
            &Format::JSON,
        )
        .unwrap();
    assert_eq!(details.id, 3);
}

#[derive(Debug, Default, Mapped)]
struct Oneway {
    request: String,
    #[mapped(read_only)]
    type_id: String,
}

#[derive(Debug, Default, Mapped)]
struct BadDynamic {
    #[mapped(read_only)]
    code: i32,
}

#[derive(Debug, Default, Mapped)]
struct SettableDynamic {
    code: String,
}

#[test]
fn test_dynamic_type_id() {
    TypeIds::register_dynamic::<Oneway, _>("type_id", |oneway| {
        Value::from(format!("Oneway:{}", oneway.request))
    })
    .unwrap();
    assert!(Annotations::is_ignored(TypeKey::of::<Oneway>(), "type_id"));
    assert!(TypeIds::id_of_type(TypeKey::of::<Oneway>()).is_none());
    let mapper = Mapper::default();
    let oneway = Oneway {
        request: "GetDetails".to_owned(),
        type_id: "stale".to_owned(),
    };
    let value = mapper
        .map_from_with(&oneway, &Format::JSON, |request| {
            request.set_type_id_handling(TypeIdHandling::Always);
        })
        .unwrap()
        .ready()
        .unwrap();
    assert_eq!(
        value,
        json(r#"{"$type":"Oneway:GetDetails","request":"GetDetails"}"#)
    );

    TypeIds::register_dynamic::<BadDynamic, _>("code", |bad| Value::from(bad.code)).unwrap();
    assert!(matches!(
        mapper.map_from_with(&BadDynamic { code: 4 }, &Format::JSON, |request| {
            request.set_type_id_handling(TypeIdHandling::Always);
        }),
        Err(Error::InvalidDynamicTypeId { .. })
    ));
    assert_eq!(
        write(&mapper, &BadDynamic { code: 4 }),
        Value::record()
    );

    assert!(matches!(
        TypeIds::register_dynamic::<SettableDynamic, _>("code", |item| Value::from(
            item.code.as_str()
        )),
        Err(Error::InvalidTypeIdMember { .. })
    ));
}

pub trait Figure {}

#[derive(Debug, Default, PartialEq, Mapped)]
struct Circle {
    radius: u32,
}

#[test]
fn test_type_id_property() {
    TypeHierarchy::extend::<Circle, dyn Figure>().unwrap();
    TypeIds::register_property::<dyn Figure>("kind").unwrap();
    TypeIds::register::<Circle>().unwrap();
    assert!(matches!(
        TypeIds::register_property::<Circle>(" "),
        Err(Error::InvalidTypeIdProperty(_))
    ));
    let mapper = Mapper::default();
    let value = mapper
        .map_from_with(&Circle { radius: 2 }, &Format::JSON, |request| {
            request.set_type_id_handling(TypeIdHandling::Always);
        })
        .unwrap()
        .ready()
        .unwrap();
    assert_eq!(value, json(r#"{"kind":"Circle","radius":2}"#));
    let object = mapper
        .map_to(
            &value,
            &Format::JSON,
            Some(Target::Type(TypeSpec::abstract_of::<dyn Figure>())),
        )
        .unwrap()
        .ready()
        .unwrap();
    assert_eq!(downcast::<Circle>(object).unwrap(), Circle { radius: 2 });
}

#[derive(Debug, Default, PartialEq, Mapped)]
struct Tile {
    side: u32,
}

#[derive(Debug, Default, Mapped)]
struct Floor {
    tile: Option<Box<dyn Reflect>>,
}

#[test]
fn test_type_id_property_of_subtype() {
    TypeIds::register_spec(Tile::type_spec(), None, Some("tile_kind")).unwrap();
    let mapper = Mapper::default();
    let floor = Floor {
        tile: Some(Box::new(Tile { side: 2 })),
    };
    let value = mapper
        .map_from_with(&floor, &Format::JSON, |request| {
            request.set_type_id_handling(TypeIdHandling::Auto);
        })
        .unwrap()
        .ready()
        .unwrap();
    assert_eq!(value, json(r#"{"tile":{"tile_kind":"Tile","side":2}}"#));
    let restored = mapper.map_to_type::<Floor>(&value, &Format::JSON).unwrap();
    assert_eq!(
        restored.tile.unwrap().downcast_ref::<Tile>(),
        Some(&Tile { side: 2 })
    );

    let address = mapper
        .map_to_type::<Address>(
            &json(r#"{"tile_kind":"Tile","street":"Side"}"#),
            &Format::JSON,
        )
        .unwrap();
    assert_eq!(address.street, "Side");
}

#[derive(Debug, Default, PartialEq, Mapped)]
struct Lion {
    roar: u32,
}

#[derive(Debug, Default, PartialEq, Mapped)]
struct Keeper {
    name: String,
}

#[derive(Debug, Default, Mapped)]
struct Enclosure {
    animal: Option<Box<dyn Reflect>>,
    keeper: Keeper,
}

#[test]
fn test_type_id_auto() {
    TypeIds::register::<Lion>().unwrap();
    TypeIds::register::<Keeper>().unwrap();
    let mapper = Mapper::default();
    let enclosure = Enclosure {
        animal: Some(Box::new(Lion { roar: 3 })),
        keeper: Keeper {
            name: "Sam".to_owned(),
        },
    };
    let value = mapper
        .map_from_with(&enclosure, &Format::JSON, |request| {
            request.set_type_id_handling(TypeIdHandling::Auto);
        })
        .unwrap()
        .ready()
        .unwrap();
    assert_eq!(
        value,
        json(r#"{"animal":{"$type":"Lion","roar":3},"keeper":{"name":"Sam"}}"#)
    );
    let restored = mapper
        .map_to_type::<Enclosure>(&value, &Format::JSON)
        .unwrap();
    let animal = restored.animal.unwrap();
    assert_eq!(animal.downcast_ref::<Lion>(), Some(&Lion { roar: 3 }));
    assert_eq!(restored.keeper.name, "Sam");

    assert_eq!(
        write(&mapper, &enclosure),
        json(r#"{"animal":{"roar":3},"keeper":{"name":"Sam"}}"#)
    );
}

#[test]
fn test_fields() {
    let mapper = Mapper::default();
    let person = person();
    let value = mapper
        .map_from_with(&person, &Format::JSON, |request| {
            request.set_fields(Fields::only(["name"]));
        })
        .unwrap()
        .ready()
        .unwrap();
    assert_eq!(value, json(r#"{"name":"Ann"}"#));

    let fields = Fields::from_value(&json(
        r#"{"name":true,"age":false,"address":{"street":true}}"#,
    ));
    let value = mapper
        .map_from_with(&person, &Format::JSON, |request| {
            request.set_fields(fields);
        })
        .unwrap()
        .ready()
        .unwrap();
    assert_eq!(value, json(r#"{"name":"Ann","address":{"street":"Main"}}"#));

    let value = mapper
        .map_from_with(&person, &Format::JSON, |request| {
            request.set_fields(Fields::Exclude);
        })
        .unwrap()
        .ready()
        .unwrap();
    assert_eq!(value, Value::record());
}

#[derive(Debug, Default, Mapped)]
struct Profile {
    name: String,
    #[mapped(extra)]
    extra: Value,
}

#[test]
fn test_dynamic_and_ignore_case() {
    let mapper = Mapper::default();
    let value = json(r#"{"NAME":"Ann","color":"red"}"#);
    let profile = mapper
        .map_to_type::<Profile>(&value, &Format::JSON)
        .unwrap();
    assert_eq!(profile.name, "");
    assert!(profile.extra.is_null());

    let profile = mapper
        .map_to_type_with::<Profile, _>(&value, &Format::JSON, |request| {
            request.set_ignore_case(true).set_dynamic(true);
        })
        .unwrap();
    assert_eq!(profile.name, "Ann");
    assert_eq!(profile.extra, json(r#"{"color":"red"}"#));
    assert_eq!(
        write(&mapper, &profile),
        json(r#"{"name":"Ann","color":"red"}"#)
    );
}

#[allow(non_snake_case)]
#[derive(Debug, Default, Mapped)]
struct Label {
    text: String,
    Text: String,
}

#[test]
fn test_ignore_case_precedence() {
    let mapper = Mapper::default();
    let label = mapper
        .map_to_type_with::<Label, _>(&json(r#"{"TEXT":"a"}"#), &Format::JSON, |request| {
            request.set_ignore_case(true);
        })
        .unwrap();
    assert_eq!(label.text, "a");
    assert_eq!(label.Text, "");

    let label = mapper
        .map_to_type_with::<Label, _>(
            &json(r#"{"Text":"b","text":"c"}"#),
            &Format::JSON,
            |request| {
                request.set_ignore_case(true);
            },
        )
        .unwrap();
    assert_eq!(label.Text, "b");
    assert_eq!(label.text, "c");
}

#[derive(Debug, Default, Mapped)]
struct Schedule {
    at: DateTime<Utc>,
    pattern: Option<Regex>,
}

#[test]
fn test_date_and_pattern() {
    let mapper = Mapper::default();
    let schedule = Schedule {
        at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        pattern: Regex::new("^a+$").ok(),
    };
    let value = write(&mapper, &schedule);
    assert_eq!(
        value,
        json(r#"{"at":"2024-01-02T03:04:05.000Z","pattern":"/^a+$/"}"#)
    );
    let restored = mapper
        .map_to_type::<Schedule>(&value, &Format::JSON)
        .unwrap();
    assert_eq!(restored.at, schedule.at);
    assert_eq!(restored.pattern.map(|pattern| pattern.as_str().to_owned()).as_deref(), Some("^a+$"));

    let restored = mapper
        .map_to_type::<Schedule>(&json(r#"{"at":0,"pattern":"/abc/gi"}"#), &Format::JSON)
        .unwrap();
    assert_eq!(restored.at, Utc.timestamp_millis_opt(0).unwrap());
    let pattern = restored.pattern.unwrap();
    assert_eq!(pattern.as_str(), "(?i)abc");
    assert!(pattern.is_match("ABC"));

    assert!(matches!(
        mapper.map_to_type::<DateTime<Utc>>(&Value::from("yesterday"), &Format::JSON),
        Err(Error::InvalidValue { .. })
    ));
    assert!(matches!(
        mapper.map_to_type::<Regex>(&Value::from("/(/"), &Format::JSON),
        Err(Error::InvalidValue { .. })
    ));
}

#[derive(Debug, Default, PartialEq, Mapped)]
enum Mood {
    #[default]
    Calm,
    Angry,
}

#[derive(Debug, Default, PartialEq, Mapped)]
struct Pet {
    mood: Mood,
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize, Mapped)]
#[mapped(serde)]
struct Color {
    r: u8,
    g: u8,
    b: u8,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Mapped)]
#[mapped(serde)]
enum Outline {
    Circle { radius: u32 },
    Square(u32),
}

#[derive(Debug, Default, Mapped)]
struct Note {
    body: Value,
    color: Color,
}

#[test]
fn test_enums_and_serde() {
    let mapper = Mapper::default();
    let pet = Pet { mood: Mood::Angry };
    assert_eq!(write(&mapper, &pet), json(r#"{"mood":"Angry"}"#));
    assert_eq!(
        mapper
            .map_to_type::<Pet>(&json(r#"{"mood":"Angry"}"#), &Format::JSON)
            .unwrap(),
        pet
    );
    assert_eq!(
        mapper
            .map_to_type::<Mood>(&Value::from(1), &Format::JSON)
            .unwrap(),
        Mood::Angry
    );
    assert!(matches!(
        mapper.map_to_type::<Mood>(&Value::from("Sad"), &Format::JSON),
        Err(Error::InvalidValue { .. })
    ));

    let color = Color { r: 1, g: 2, b: 3 };
    assert_eq!(write(&mapper, &color), json(r#"{"r":1,"g":2,"b":3}"#));
    assert_eq!(
        mapper
            .map_to_type::<Color>(&json(r#"{"r":1,"g":2,"b":3}"#), &Format::JSON)
            .unwrap(),
        color
    );
    let outline = Outline::Circle { radius: 4 };
    assert_eq!(
        write(&mapper, &outline),
        json(r#"{"Circle":{"radius":4}}"#)
    );
    assert_eq!(
        mapper
            .map_to_type::<Outline>(&json(r#"{"Square":2}"#), &Format::JSON)
            .unwrap(),
        Outline::Square(2)
    );

    let note = Note {
        body: json(r#"{"text":["x",1]}"#),
        color,
    };
    let value = write(&mapper, &note);
    assert_eq!(
        value,
        json(r#"{"body":{"text":["x",1]},"color":{"r":1,"g":2,"b":3}}"#)
    );
    let restored = mapper
        .map_to_type::<Note>(&json(r#"{"body":null}"#), &Format::JSON)
        .unwrap();
    assert!(restored.body.is_null());
}

#[test]
fn test_arrays() {
    let mapper = Mapper::default();
    let value = json(r#"[{"street":"A","number":1},{"street":"B","number":2}]"#);
    assert!(matches!(
        mapper.map_to(
            &value,
            &Format::JSON,
            Some(Target::array_of(Target::instance(Address::default())))
        ),
        Err(Error::ArrayTypeNotInferable)
    ));
    let items = mapper
        .map_to(&value, &Format::JSON, Some(Target::of::<Address>()))
        .unwrap()
        .ready()
        .unwrap();
    let items = downcast::<Vec<Box<dyn Reflect>>>(items).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(
        items[1].downcast_ref::<Address>(),
        Some(&Address {
            street: "B".to_owned(),
            number: 2
        })
    );
    let items = mapper
        .map_to_type::<Vec<Address>>(&value, &Format::JSON)
        .unwrap();
    assert_eq!(items[0].street, "A");
    assert_eq!(write(&mapper, &items), value);
    assert!(matches!(
        mapper.map_to_type::<Vec<u32>>(&json("[1,null]"), &Format::JSON),
        Err(Error::InvalidValue { .. })
    ));
    assert_eq!(
        mapper
            .map_to_type::<Vec<Option<u32>>>(&json("[1,null]"), &Format::JSON)
            .unwrap(),
        vec![Some(1), None]
    );
    let moods = mapper
        .map_to(&json(r#"["Calm","Angry"]"#), &Format::JSON, Some(Target::of::<Mood>()))
        .unwrap()
        .ready()
        .unwrap();
    let moods = downcast::<Vec<Box<dyn Reflect>>>(moods).unwrap();
    assert_eq!(moods[0].downcast_ref::<Mood>(), Some(&Mood::Calm));
    assert_eq!(moods[1].downcast_ref::<Mood>(), Some(&Mood::Angry));
    let numbers = mapper
        .map_to(&json("[1,2]"), &Format::JSON, Some(Target::of::<i32>()))
        .unwrap()
        .ready()
        .unwrap();
    let numbers = downcast::<Vec<Box<dyn Reflect>>>(numbers).unwrap();
    assert_eq!(numbers[1].downcast_ref::<i32>(), Some(&2));
    assert_eq!(
        mapper
            .map_to_type::<Value>(&json("[1,2]"), &Format::JSON)
            .unwrap(),
        json("[1,2]")
    );
}

#[derive(Debug, Default, Mapped)]
struct Celsius {
    degrees: i32,
}

struct CelsiusText;

impl Handler for CelsiusText {
    fn handler_key(&self) -> TypeKey {
        TypeKey::of::<Self>()
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![Binding::maps_from("celsius", Constraint::of::<Celsius>())]
    }

    fn maps_from(
        &self,
        _member: &str,
        request: &MapFrom,
        _composer: &Mapper,
    ) -> Result<Contribution<Value>> {
        Ok(request
            .subject()
            .downcast_ref::<Celsius>()
            .map(|celsius| Value::from(format!("{}C", celsius.degrees)))
            .into())
    }
}

#[derive(Debug, Default, Mapped)]
struct Kelvin {
    degrees: u32,
}

struct KelvinText;

impl KelvinText {
    fn new() -> Self {
        FormatTags::register::<Self>([Format::new("text")]).unwrap();
        Self
    }
}

impl Handler for KelvinText {
    fn handler_key(&self) -> TypeKey {
        TypeKey::of::<Self>()
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![
            Binding::maps_from("kelvin", Constraint::of::<Kelvin>()),
            Binding::maps_to("kelvin", Constraint::of::<Kelvin>()),
        ]
    }

    fn maps_from(
        &self,
        _member: &str,
        request: &MapFrom,
        _composer: &Mapper,
    ) -> Result<Contribution<Value>> {
        Ok(request
            .subject()
            .downcast_ref::<Kelvin>()
            .map(|kelvin| Value::from(format!("{}K", kelvin.degrees)))
            .into())
    }

    fn maps_to(
        &self,
        _member: &str,
        request: &mut MapTo,
        _composer: &Mapper,
    ) -> Result<Contribution<Box<dyn Reflect>>> {
        Ok(request
            .value()
            .as_str()
            .and_then(|text| text.strip_suffix('K'))
            .and_then(|degrees| degrees.parse::<u32>().ok())
            .map(|degrees| Box::new(Kelvin { degrees }) as Box<dyn Reflect>)
            .into())
    }
}

#[test]
fn test_custom_handlers() {
    let celsius = Celsius { degrees: 21 };
    let mapper = Mapper::new()
        .with_handler(CelsiusText)
        .with_handler(JsonMapping::new());
    assert_eq!(write(&mapper, &celsius), Value::from("21C"));
    let mapper = Mapper::default().with_handler(CelsiusText);
    assert_eq!(write(&mapper, &celsius), json(r#"{"degrees":21}"#));

    let text = Format::new("text");
    let kelvin = Kelvin { degrees: 300 };
    let mapper = Mapper::default().with_handler(KelvinText::new());
    assert_eq!(
        mapper.map_from(&kelvin, &text).unwrap().ready().unwrap(),
        Value::from("300K")
    );
    assert_eq!(write(&mapper, &kelvin), json(r#"{"degrees":300}"#));
    let restored = mapper
        .map_to_type::<Kelvin>(&Value::from("273K"), &text)
        .unwrap();
    assert_eq!(restored.degrees, 273);
    assert!(mapper
        .map_from(&kelvin, &Format::new("yaml"))
        .unwrap_err()
        .is_not_handled());

    FormatTags::register_member::<KelvinText>("kelvin", [Format::new("plain")]).unwrap();
    assert!(mapper.map_from(&kelvin, &text).unwrap_err().is_not_handled());
    assert_eq!(
        mapper
            .map_from(&kelvin, &Format::new("plain"))
            .unwrap()
            .ready()
            .unwrap(),
        Value::from("300K")
    );
}

#[test]
fn test_dispatch_order() {
    let mapper = Mapper::default();
    let members = |policy, key, list| {
        mapper
            .select(policy, &DispatchKey::new(key, list), &Format::JSON)
            .into_iter()
            .map(|candidate| candidate.binding.member)
            .collect::<Vec<_>>()
    };
    assert_eq!(
        members(Policy::MapsFrom, TypeKey::of::<DateTime<Utc>>(), false),
        vec!["map_from_date", "map_from_object"]
    );
    assert_eq!(
        members(Policy::MapsFrom, TypeKey::of::<Vec<i32>>(), true),
        vec!["map_from_array", "map_from_object"]
    );
    assert_eq!(
        members(Policy::MapsTo, TypeKey::of::<Regex>(), false),
        vec!["map_to_regex", "map_to_object"]
    );
    assert_eq!(
        members(Policy::MapsTo, TypeKey::of::<Value>(), false),
        vec!["map_to_object"]
    );
}

#[derive(Debug, Default, Mapped)]
struct Sealed {
    code: u32,
}

#[derive(Debug, Default, Mapped)]
struct SpecialSealed {
    code: u32,
}

struct SealedMapping;

impl Handler for SealedMapping {
    fn handler_key(&self) -> TypeKey {
        TypeKey::of::<Self>()
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![
            Binding::maps_to("any", Constraint::Any),
            Binding::maps_to("special", Constraint::of::<SpecialSealed>()),
            Binding::maps_to("exact", Constraint::of::<Sealed>()),
            Binding::maps_from("base", Constraint::of::<Sealed>()),
            Binding::maps_from("exact", Constraint::of::<SpecialSealed>()),
        ]
    }
}

#[test]
fn test_variance() {
    TypeHierarchy::extend::<SpecialSealed, Sealed>().unwrap();
    assert!(TypeHierarchy::extend::<Sealed, SpecialSealed>().is_err());
    assert!(TypeHierarchy::extend::<Sealed, Sealed>().is_err());
    let mapper = Mapper::new().with_handler(SealedMapping);
    let members = |policy, key| {
        mapper
            .select(policy, &DispatchKey::new(key, false), &Format::JSON)
            .into_iter()
            .map(|candidate| candidate.binding.member)
            .collect::<Vec<_>>()
    };
    assert_eq!(
        members(Policy::MapsTo, TypeKey::of::<Sealed>()),
        vec!["exact", "special", "any"]
    );
    assert_eq!(
        members(Policy::MapsTo, TypeKey::of::<SpecialSealed>()),
        vec!["special", "any"]
    );
    assert_eq!(
        members(Policy::MapsFrom, TypeKey::of::<SpecialSealed>()),
        vec!["exact", "base"]
    );
    assert_eq!(members(Policy::MapsFrom, TypeKey::of::<Sealed>()), vec!["base"]);
}

#[derive(Debug, Default, Mapped)]
struct Slow {
    value: i32,
}

#[derive(Debug, Default, Mapped)]
struct SlowHolder {
    slow: Slow,
}

struct SlowMapping;

impl Handler for SlowMapping {
    fn handler_key(&self) -> TypeKey {
        TypeKey::of::<Self>()
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![Binding::maps_from("slow", Constraint::of::<Slow>())]
    }

    fn maps_from(
        &self,
        _member: &str,
        request: &MapFrom,
        _composer: &Mapper,
    ) -> Result<Contribution<Value>> {
        let value = request.subject().downcast_ref::<Slow>().map(|slow| slow.value);
        Ok(Contribution::pending(async move {
            Ok(value
                .filter(|value| *value >= 0)
                .map(|value| Value::from(value * 10)))
        }))
    }
}

#[test]
fn test_deferred() {
    let mapper = Mapper::new()
        .with_handler(SlowMapping)
        .with_handler(JsonMapping::new());
    let result = mapper.map_from(&Slow { value: 4 }, &Format::JSON).unwrap();
    assert!(result.is_deferred());
    assert_eq!(block_on(result.resolve()).unwrap(), Value::from(40));

    let result = mapper.map_from(&Slow { value: -1 }, &Format::JSON).unwrap();
    assert_eq!(
        block_on(result.resolve()).unwrap(),
        json(r#"{"value":-1}"#)
    );

    let mapper = Mapper::default().with_handler(SlowMapping);
    let result = mapper.map_from(&Slow { value: 4 }, &Format::JSON).unwrap();
    assert!(result.is_deferred());
    assert_eq!(
        block_on(result.resolve()).unwrap(),
        json(r#"{"value":4}"#)
    );

    let mapper = Mapper::new().with_handler(SlowMapping);
    let result = mapper.map_from(&Slow { value: -1 }, &Format::JSON).unwrap();
    assert!(block_on(result.resolve()).unwrap_err().is_not_handled());

    let mapper = Mapper::new()
        .with_handler(SlowMapping)
        .with_handler(JsonMapping::new());
    assert!(matches!(
        mapper.map_from(&SlowHolder::default(), &Format::JSON),
        Err(Error::DeferredResult(_))
    ));
}

#[test]
fn test_value() {
    let mut value = Value::record().property("a", 1).property("b", "x");
    assert_eq!(value.insert("a", 2), Some(Value::from(1)));
    assert_eq!(value.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(value, Value::record().property("b", "x").property("a", 2));
    assert_eq!(value.remove("b"), Some(Value::from("x")));
    assert_eq!(value.len(), 1);
    assert_eq!(Value::from(1u8), Value::from(1.0));
    assert_eq!(
        serde_json::to_string(&Value::array().item(1).item(Value::Null)).unwrap(),
        "[1,null]"
    );
    assert_eq!(value.to_string(), r#"{"a":2}"#);
    assert_eq!(Value::from("raw").to_string(), "raw");
}
