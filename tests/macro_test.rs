#![allow(missing_docs)]

use std::sync::Arc;

use parking_lot::Mutex;

use graphcodec::reflect::{Kind, TypeHandle};
use graphcodec::{
    BinaryFormatter, Decimal, DeserializationCallback, GraphCodecError, Inspector, ObjectGraph,
    ObjectId, Persistent, Reflect, StateBag, StateObject, TypeCatalog, Value,
};

// --- BASE CHAINS AND TRANSIENT FIELDS ---

#[derive(Persistent, Default, Debug, PartialEq)]
#[persist(name = "tests.macro.Entity")]
struct Entity {
    id: u32,
    #[persist(transient)]
    dirty: bool,
}

#[derive(Persistent, Default, Debug, PartialEq)]
#[persist(name = "tests.macro.Shape")]
struct ShapeBase {
    label: String,
    #[persist(base)]
    entity: Entity,
}

#[derive(Persistent, Default, Debug, PartialEq)]
#[persist(name = "tests.macro.Circle")]
struct Circle {
    radius: f64,
    #[persist(transient)]
    cached_area: Option<f64>,
    #[persist(base)]
    shape: ShapeBase,
}

#[derive(Persistent, Default, Debug, PartialEq)]
#[persist(name = "tests.macro.Meters")]
struct Meters(f64, #[persist(transient)] u8);

// --- SELF-DESCRIBING ---

#[derive(Persistent, Debug, PartialEq)]
#[persist(name = "tests.macro.Money", state)]
struct Money {
    amount: Decimal,
    currency: String,
}

impl StateObject for Money {
    fn export_state(&self, bag: &mut StateBag) -> graphcodec::Result<()> {
        bag.add("amount", self.amount);
        bag.add("currency", self.currency.as_str());
        Ok(())
    }

    fn from_state(mut bag: StateBag) -> graphcodec::Result<Self> {
        let amount = match bag.take("amount") {
            Some(Value::Decimal(amount)) => amount,
            other => {
                return Err(GraphCodecError::CorruptGraph(format!(
                    "bad amount: {other:?}"
                )))
            }
        };
        let currency = bag
            .require("currency")?
            .as_str()
            .ok_or_else(|| GraphCodecError::CorruptGraph("currency is not a string".into()))?
            .to_owned();
        Ok(Self { amount, currency })
    }
}

#[derive(Persistent, Debug)]
#[persist(name = "tests.macro.Knot", state)]
struct Knot {
    name: String,
    peer: Option<ObjectId>,
}

impl StateObject for Knot {
    fn export_state(&self, bag: &mut StateBag) -> graphcodec::Result<()> {
        bag.add("name", self.name.as_str());
        bag.add("peer", self.peer);
        Ok(())
    }

    fn from_state(bag: StateBag) -> graphcodec::Result<Self> {
        let name = bag
            .require("name")?
            .as_str()
            .ok_or_else(|| GraphCodecError::CorruptGraph("name is not a string".into()))?
            .to_owned();
        let peer = match bag.require("peer")? {
            Value::Null => None,
            other => Some(other.as_object().ok_or_else(|| {
                GraphCodecError::CorruptGraph(format!("peer is not an object: {other:?}"))
            })?),
        };
        Ok(Self { name, peer })
    }
}

// --- CALLBACKS ---

#[derive(Persistent, Default, Debug)]
#[persist(name = "tests.macro.Part")]
struct Part {
    weight: i64,
}

#[derive(Persistent, Default, Debug)]
#[persist(name = "tests.macro.Assembly", callback)]
struct Assembly {
    parts: Vec<ObjectId>,
    #[persist(transient)]
    total_weight: i64,
}

impl DeserializationCallback for Assembly {
    fn on_deserialized(&mut self, _id: ObjectId, graph: &ObjectGraph) -> graphcodec::Result<()> {
        self.total_weight = self
            .parts
            .iter()
            .map(|id| {
                graph
                    .get::<Part>(*id)
                    .map(|part| part.weight)
                    .ok_or_else(|| GraphCodecError::CorruptGraph(format!("part {id} missing")))
            })
            .sum::<graphcodec::Result<i64>>()?;
        Ok(())
    }
}

static CALLBACK_ORDER: Mutex<Vec<String>> = parking_lot::const_mutex(Vec::new());

#[derive(Persistent, Default, Debug)]
#[persist(name = "tests.macro.Household", callback)]
struct Household {
    members: Vec<ObjectId>,
}

impl DeserializationCallback for Household {
    fn on_deserialized(&mut self, _id: ObjectId, _graph: &ObjectGraph) -> graphcodec::Result<()> {
        CALLBACK_ORDER.lock().push("household".into());
        Ok(())
    }
}

#[derive(Persistent, Default, Debug)]
#[persist(name = "tests.macro.Member", callback)]
struct Member {
    name: String,
    household: Option<ObjectId>,
    #[persist(transient)]
    household_size: usize,
}

impl DeserializationCallback for Member {
    fn on_deserialized(&mut self, _id: ObjectId, graph: &ObjectGraph) -> graphcodec::Result<()> {
        // The household is filled only after all its members are decoded.
        let household = self
            .household
            .and_then(|id| graph.get::<Household>(id))
            .ok_or_else(|| GraphCodecError::CorruptGraph("household not wired".into()))?;
        self.household_size = household.members.len();
        CALLBACK_ORDER.lock().push(self.name.clone());
        Ok(())
    }
}

#[derive(Persistent, Default, Debug)]
#[persist(name = "tests.macro.Loop", callback)]
struct Loop {
    next: Option<ObjectId>,
    #[persist(transient)]
    closes_on_itself: bool,
}

impl DeserializationCallback for Loop {
    fn on_deserialized(&mut self, id: ObjectId, graph: &ObjectGraph) -> graphcodec::Result<()> {
        self.closes_on_itself = self.next == Some(id) && graph.get::<Loop>(id).is_none();
        Ok(())
    }
}

// --- EVENT HOOKS ---

static EVENTS: Mutex<Vec<String>> = parking_lot::const_mutex(Vec::new());

#[derive(Persistent, Default, Debug)]
#[persist(
    name = "tests.macro.Tracked",
    callback,
    on_serializing = "before_write",
    on_serialized = "after_write",
    on_deserializing = "before_read",
    on_deserialized = "after_read"
)]
struct Tracked {
    label: String,
    child: Option<ObjectId>,
}

impl Tracked {
    fn before_write(&self) -> graphcodec::Result<()> {
        EVENTS.lock().push(format!("serializing {}", self.label));
        Ok(())
    }

    fn after_write(&self) -> graphcodec::Result<()> {
        EVENTS.lock().push(format!("serialized {}", self.label));
        Ok(())
    }

    fn before_read(&mut self) -> graphcodec::Result<()> {
        EVENTS.lock().push(format!("deserializing <{}>", self.label));
        Ok(())
    }

    fn after_read(&mut self) -> graphcodec::Result<()> {
        EVENTS.lock().push(format!("deserialized <{}>", self.label));
        Ok(())
    }
}

impl DeserializationCallback for Tracked {
    fn on_deserialized(&mut self, _id: ObjectId, _graph: &ObjectGraph) -> graphcodec::Result<()> {
        EVENTS.lock().push(format!("callback {}", self.label));
        Ok(())
    }
}

#[derive(Persistent, Default, Debug)]
#[persist(name = "tests.macro.Vetoed", on_serializing = "refuse")]
struct Vetoed {
    flag: bool,
}

impl Vetoed {
    fn refuse(&self) -> graphcodec::Result<()> {
        Err(GraphCodecError::UnsupportedType("vetoed".into()))
    }
}

// --- VALUE TYPES ---

#[derive(Persistent, Default, Debug, PartialEq, Clone, Copy)]
#[persist(name = "tests.macro.Point", value)]
struct Point {
    x: i32,
    y: i32,
}

#[derive(Persistent, Default, Debug, PartialEq)]
#[persist(name = "tests.macro.Polyline")]
struct Polyline {
    origin: Point,
    points: Vec<Point>,
    anchor: Option<Point>,
}

// --- TYPES THAT CANNOT BE MARSHALLED ---

#[allow(dead_code)]
#[derive(Reflect, Default)]
#[persist(name = "tests.macro.Opaque")]
struct Opaque {
    secret: u64,
}

#[derive(Persistent, Default)]
#[persist(name = "tests.macro.Leaky")]
struct Leaky {
    visible: u32,
    #[persist(base)]
    hidden: Opaque,
}

#[derive(Persistent)]
#[persist(name = "tests.macro.RawHandle", no_default)]
struct RawHandle {
    raw: u64,
}

fn setup() -> graphcodec::Result<BinaryFormatter> {
    let catalog = Arc::new(TypeCatalog::new());
    catalog
        .register::<Circle>()?
        .register::<Meters>()?
        .register::<Money>()?
        .register::<Part>()?
        .register::<Assembly>()?
        .register::<Household>()?
        .register::<Member>()?
        .register::<Loop>()?
        .register::<Tracked>()?
        .register::<Vetoed>()?
        .register::<Knot>()?
        .register::<Point>()?
        .register::<Polyline>()?;
    Ok(BinaryFormatter::new(catalog))
}

fn circle() -> Circle {
    Circle {
        radius: 2.5,
        cached_area: Some(19.63),
        shape: ShapeBase {
            label: "disc".into(),
            entity: Entity { id: 9, dirty: true },
        },
    }
}

/// Own fields come first, then each base's fields, transient ones excluded.
#[test]
fn test_field_order_own_then_base() -> graphcodec::Result<()> {
    let formatter = setup()?;
    let thunk = formatter.catalog().thunk(&TypeHandle::of::<Circle>())?;

    assert_eq!(
        thunk.fields(),
        vec![
            ("tests.macro.Circle", "radius"),
            ("tests.macro.Shape", "label"),
            ("tests.macro.Entity", "id"),
        ]
    );
    assert_eq!(thunk.kind(), Kind::Reference);
    assert!(!thunk.is_self_describing());

    let mut graph = ObjectGraph::new();
    let id = graph.insert(circle());
    let bytes = formatter.serialize(&graph, &Value::Object(id))?;
    let body = &bytes[Inspector::inspect(&bytes)?.header_size..];
    assert_eq!(body[0], 20); // Circle
    assert_eq!(body[1], 12); // radius: Double
    assert_eq!(body[10], 16); // label: String
    Ok(())
}

/// Base fields round trip; transient fields come back as their defaults.
#[test]
fn test_base_and_transient_round_trip() -> graphcodec::Result<()> {
    let formatter = setup()?;
    let mut graph = ObjectGraph::new();
    let id = graph.insert(circle());

    let snapshot = formatter.deserialize(&formatter.serialize(&graph, &Value::Object(id))?)?;
    let decoded = snapshot.root_as::<Circle>().expect("circle");

    let expected = Circle {
        cached_area: None,
        shape: ShapeBase {
            label: "disc".into(),
            entity: Entity { id: 9, dirty: false },
        },
        ..circle()
    };
    assert_eq!(decoded, &expected);
    Ok(())
}

/// Tuple structs name their fields by position.
#[test]
fn test_tuple_struct() -> graphcodec::Result<()> {
    let formatter = setup()?;
    let thunk = formatter.catalog().thunk(&TypeHandle::of::<Meters>())?;
    assert_eq!(thunk.fields(), vec![("tests.macro.Meters", "0")]);

    let mut graph = ObjectGraph::new();
    let id = graph.insert(Meters(1.25, 200));
    let snapshot = formatter.deserialize(&formatter.serialize(&graph, &Value::Object(id))?)?;
    assert_eq!(snapshot.root_as::<Meters>(), Some(&Meters(1.25, 0)));
    Ok(())
}

/// Self-describing types write a member bag instead of compiled fields.
#[test]
fn test_state_object_round_trip() -> graphcodec::Result<()> {
    let formatter = setup()?;
    let thunk = formatter.catalog().thunk(&TypeHandle::of::<Money>())?;
    assert!(thunk.is_self_describing());
    assert!(thunk.fields().is_empty());

    let money = Money {
        amount: Decimal::new(1999, 2).expect("fits"),
        currency: "EUR".into(),
    };
    let mut graph = ObjectGraph::new();
    let id = graph.insert(Money {
        amount: money.amount,
        currency: money.currency.clone(),
    });

    let bytes = formatter.serialize(&graph, &Value::Object(id))?;
    let body = &bytes[Inspector::inspect(&bytes)?.header_size..];
    assert_eq!(&body[..5], &[20, 2, 0, 0, 0]); // tag, member count
    assert_eq!(&body[5..12], &[6, b'a', b'm', b'o', b'u', b'n', b't']);

    let snapshot = formatter.deserialize(&bytes)?;
    assert_eq!(snapshot.root_as::<Money>(), Some(&money));
    Ok(())
}

/// Members of a state bag recurse through the codec, so a cycle through two bags closes.
#[test]
fn test_state_object_cycle() -> graphcodec::Result<()> {
    let formatter = setup()?;
    let mut graph = ObjectGraph::new();
    let a = graph.insert(Knot {
        name: "a".into(),
        peer: None,
    });
    let b = graph.insert(Knot {
        name: "b".into(),
        peer: Some(a),
    });
    graph.get_mut::<Knot>(a).expect("a").peer = Some(b);

    let bytes = formatter.serialize(&graph, &Value::Object(a))?;
    assert_eq!(Inspector::inspect(&bytes)?.object_count, 2);

    let snapshot = formatter.deserialize(&bytes)?;
    let a2 = snapshot.root_object().expect("root");
    let b2 = snapshot.graph.get::<Knot>(a2).and_then(|k| k.peer).expect("a.peer");
    let back = snapshot.graph.get::<Knot>(b2).expect("b");
    assert_eq!(back.name, "b");
    assert_eq!(back.peer, Some(a2));
    Ok(())
}

/// Callbacks run after the whole graph is wired, and can be switched off.
#[test]
fn test_deserialization_callback() -> graphcodec::Result<()> {
    let formatter = setup()?;
    let mut graph = ObjectGraph::new();
    let parts = vec![
        graph.insert(Part { weight: 3 }),
        graph.insert(Part { weight: 4 }),
        graph.insert(Part { weight: 5 }),
    ];
    let assembly = graph.insert(Assembly {
        parts,
        total_weight: 0,
    });
    let bytes = formatter.serialize(&graph, &Value::Object(assembly))?;

    let snapshot = formatter.deserialize(&bytes)?;
    assert_eq!(
        snapshot.root_as::<Assembly>().expect("assembly").total_weight,
        12
    );

    let quiet = BinaryFormatter::builder()
        .catalog(Arc::clone(formatter.catalog()))
        .run_callbacks(false)
        .build();
    let snapshot = quiet.deserialize(&bytes)?;
    assert_eq!(
        snapshot.root_as::<Assembly>().expect("assembly").total_weight,
        0
    );
    Ok(())
}

/// Callbacks wait for the whole graph, then run in first-encountered order.
#[test]
fn test_callbacks_run_after_whole_graph_in_encounter_order() -> graphcodec::Result<()> {
    let formatter = setup()?;
    let mut graph = ObjectGraph::new();
    let household = graph.insert(Household::default());
    let ann = graph.insert(Member {
        name: "ann".into(),
        household: Some(household),
        household_size: 0,
    });
    let bob = graph.insert(Member {
        name: "bob".into(),
        household: Some(household),
        household_size: 0,
    });
    graph.get_mut::<Household>(household).expect("household").members = vec![ann, bob];

    let bytes = formatter.serialize(&graph, &Value::Object(household))?;
    CALLBACK_ORDER.lock().clear();
    let snapshot = formatter.deserialize(&bytes)?;

    assert_eq!(*CALLBACK_ORDER.lock(), vec!["household", "ann", "bob"]);
    let members = &snapshot.root_as::<Household>().expect("household").members;
    for id in members {
        assert_eq!(snapshot.graph.get::<Member>(*id).expect("member").household_size, 2);
    }
    Ok(())
}

/// A callback receives its own id, so a reference back to itself is recognisable.
#[test]
fn test_callback_receives_own_id() -> graphcodec::Result<()> {
    let formatter = setup()?;
    let mut graph = ObjectGraph::new();
    let me = graph.insert(Loop::default());
    graph.get_mut::<Loop>(me).expect("loop").next = Some(me);

    let snapshot = formatter.deserialize(&formatter.serialize(&graph, &Value::Object(me))?)?;
    assert!(snapshot.root_as::<Loop>().expect("loop").closes_on_itself);
    Ok(())
}

/// Event hooks bracket each object's own fields; graph callbacks run last.
#[test]
fn test_event_hook_order() -> graphcodec::Result<()> {
    let formatter = setup()?;
    let mut graph = ObjectGraph::new();
    let b = graph.insert(Tracked {
        label: "b".into(),
        child: None,
    });
    let a = graph.insert(Tracked {
        label: "a".into(),
        child: Some(b),
    });

    EVENTS.lock().clear();
    let bytes = formatter.serialize(&graph, &Value::Object(a))?;
    assert_eq!(
        *EVENTS.lock(),
        vec!["serializing a", "serializing b", "serialized b", "serialized a"]
    );

    EVENTS.lock().clear();
    let snapshot = formatter.deserialize(&bytes)?;
    assert_eq!(
        *EVENTS.lock(),
        vec![
            "deserializing <>",
            "deserializing <>",
            "deserialized <b>",
            "deserialized <a>",
            "callback a",
            "callback b",
        ]
    );
    let root = snapshot.root_as::<Tracked>().expect("tracked");
    assert_eq!(root.label, "a");
    Ok(())
}

/// An error returned by an event hook aborts the call.
#[test]
fn test_event_hook_error_aborts() -> graphcodec::Result<()> {
    let formatter = setup()?;
    let mut graph = ObjectGraph::new();
    let id = graph.insert(Vetoed { flag: true });

    let result = formatter.serialize(&graph, &Value::Object(id));
    assert!(matches!(result, Err(GraphCodecError::UnsupportedType(msg)) if msg == "vetoed"));
    Ok(())
}

/// Value types are written inline each time and never enter the object table.
#[test]
fn test_value_types_inline() -> graphcodec::Result<()> {
    let formatter = setup()?;
    let polyline = Polyline {
        origin: Point { x: -1, y: 1 },
        points: vec![Point { x: 0, y: 0 }, Point { x: 3, y: 4 }, Point { x: 0, y: 0 }],
        anchor: None,
    };
    let mut graph = ObjectGraph::new();
    let id = graph.insert(Polyline {
        points: polyline.points.clone(),
        ..polyline
    });

    let bytes = formatter.serialize(&graph, &Value::Object(id))?;
    let report = Inspector::inspect(&bytes)?;
    assert_eq!(report.object_count, 1);
    assert_eq!(report.types.len(), 2);

    let snapshot = formatter.deserialize(&bytes)?;
    assert_eq!(snapshot.root_as::<Polyline>(), Some(&polyline));
    assert_eq!(snapshot.graph.len(), 1);
    Ok(())
}

/// A value type cannot be referenced by identity.
#[test]
fn test_value_type_by_reference_is_unsupported() -> graphcodec::Result<()> {
    let formatter = setup()?;
    assert_eq!(
        formatter.catalog().thunk(&TypeHandle::of::<Point>())?.kind(),
        Kind::Value
    );

    let mut graph = ObjectGraph::new();
    let id = graph.insert(Point { x: 1, y: 2 });
    let result = formatter.serialize(&graph, &Value::Object(id));
    assert!(matches!(result, Err(GraphCodecError::UnsupportedType(_))));
    Ok(())
}

/// Types that did not opt into persistence fail, directly or as a base.
#[test]
fn test_not_serializable() -> graphcodec::Result<()> {
    let formatter = setup()?;

    let mut graph = ObjectGraph::new();
    let opaque = graph.insert(Opaque { secret: 1 });
    let leaky = graph.insert(Leaky {
        visible: 2,
        hidden: Opaque::default(),
    });

    assert!(matches!(
        formatter.serialize(&graph, &Value::Object(opaque)),
        Err(GraphCodecError::NotSerializable(_))
    ));
    assert!(matches!(
        formatter.serialize(&graph, &Value::Object(leaky)),
        Err(GraphCodecError::NotSerializable(_))
    ));
    Ok(())
}

/// A type without any constructor fails, the failure is not cached, and other types still work.
#[test]
fn test_unsupported_type_does_not_poison_cache() -> graphcodec::Result<()> {
    let formatter = setup()?;
    let mut graph = ObjectGraph::new();
    let handle = graph.insert(RawHandle { raw: 0xFFFF });
    let part = graph.insert(Part { weight: 1 });

    for _ in 0..2 {
        let result = formatter.serialize(&graph, &Value::Object(handle));
        assert!(matches!(result, Err(GraphCodecError::UnsupportedType(_))));
    }
    let cached_before = formatter.catalog().compiler().cached_len();

    let bytes = formatter.serialize(&graph, &Value::Object(part))?;
    assert!(formatter.deserialize(&bytes)?.root_as::<Part>().is_some());
    assert_eq!(formatter.catalog().compiler().cached_len(), cached_before + 1);

    let raw = graph.get::<RawHandle>(handle).map(|h| h.raw);
    assert_eq!(raw, Some(0xFFFF));
    Ok(())
}

/// Registration is idempotent for identical requests and rejects conflicts.
#[test]
fn test_registration_conflicts() -> graphcodec::Result<()> {
    #[derive(Persistent, Default)]
    #[persist(name = "tests.macro.Dup")]
    struct First {
        a: u8,
    }

    #[derive(Persistent, Default)]
    #[persist(name = "tests.macro.Dup")]
    struct Second {
        b: u8,
    }

    #[derive(Persistent, Default)]
    #[persist(name = "tests.macro.Numbered", id = 77)]
    struct Numbered {
        c: u8,
    }

    let catalog = TypeCatalog::new();
    catalog.register::<First>()?;
    catalog.register::<First>()?;
    catalog.register::<Numbered>()?;
    assert_eq!(catalog.len(), 2);

    assert!(matches!(
        catalog.register::<Second>(),
        Err(GraphCodecError::Registration(_))
    ));
    assert!(matches!(
        catalog.register_with_id::<First>(5),
        Err(GraphCodecError::Registration(_))
    ));
    assert!(matches!(
        catalog.register_with_id::<Point>(77),
        Err(GraphCodecError::Registration(_))
    ));

    assert_eq!(catalog.resolve_compact(77).map(|h| h.name()), Some(Numbered::NAME));
    assert!(catalog.is_registered::<Numbered>());
    assert!(!catalog.is_registered::<Second>());
    Ok(())
}

/// Default names come from the module path.
#[test]
fn test_default_type_name() {
    #[derive(Persistent, Default)]
    struct Unnamed {
        _x: u8,
    }

    assert_eq!(Unnamed::NAME, concat!(module_path!(), "::Unnamed"));
    assert_eq!(Unnamed::COMPACT_ID, None);
    assert_eq!(Circle::NAME, "tests.macro.Circle");
}
