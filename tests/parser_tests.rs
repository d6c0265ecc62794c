//! Integration tests for document resolution.
//!
//! Builds a small registry of classes in code and runs whole documents through the parser:
//! inheritance chains, submodule defaults, anchors and references, search grids, and the
//! object layer on top of the resolved trees.

use config_graph::error::ConfigError;
use config_graph::parser::{Parser, check_missing};
use config_graph::registry::Registry;
use config_graph::schema::{ConfigClass, FieldSchema};
use serde_json::{Value, json};

/// A child type with one variant and a module type with two chained variants.
fn create_registry() -> Registry {
    let mut registry = Registry::new();

    let child = ConfigClass::builder("child", "child_a")
        .describe("child config")
        .field(FieldSchema::string("i_am_child", "child value").build().unwrap())
        .field(FieldSchema::float("i_am_float_child", 0).build().unwrap())
        .build()
        .unwrap();
    registry.register(child).unwrap();

    let nested = ConfigClass::inline("nested")
        .field(FieldSchema::string("nest_key", "nest value").build().unwrap())
        .field(FieldSchema::float("nest_key2", 0).build().unwrap())
        .build()
        .unwrap();
    let config_a = ConfigClass::builder("module", "config_a")
        .describe("module config")
        .field(
            FieldSchema::float("epsilon", 1.0)
                .minimum(0.0)
                .additions(vec![json!(-2)])
                .help("epsilon")
                .build()
                .unwrap(),
        )
        .field(FieldSchema::list("list_test", json!(["name"])).build().unwrap())
        .field(FieldSchema::nested("nested", nested).build().unwrap())
        .submodule(
            "child#1",
            json!({"i_am_child": "child value1", "_base": "child_a"}),
        )
        .submodule(
            "child#2",
            json!({"i_am_child": "child value2", "_base": "child_a"}),
        )
        .build()
        .unwrap();
    let config_a = registry.register(config_a).unwrap();

    let config_a_1 = ConfigClass::builder("module", "config_a_1")
        .extends(&config_a)
        .field(
            FieldSchema::float("epsilon", 2.0)
                .minimum(-10.0)
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    registry.register(config_a_1).unwrap();

    registry
}

fn epsilon(config: &Value) -> f64 {
    config["@module"]["epsilon"].as_f64().unwrap()
}

#[test]
fn test_simple_parse() {
    let registry = create_registry();
    let parser = Parser::new(&registry);
    let document = json!({
        "@module": {
            "_base": "config_a_1",
            "epsilon": 8.0,
        }
    });

    let objects = parser.parse_root_and_instantiate(&document).unwrap();
    assert_eq!(objects.len(), 1);
    let module = objects[0].submodule("@module").unwrap();
    assert_eq!(module.get_f64("epsilon"), Some(8.0));
    assert_eq!(module.get("list_test"), Some(&json!(["name"])));
    // inherited submodule defaults are instantiated too
    let child = module.submodule("#2").unwrap();
    assert_eq!(child.get_str("i_am_child"), Some("child value2"));
    assert_eq!(child.get_f64("i_am_float_child"), Some(0.0));
}

#[test]
fn test_inherited_bounds_apply() {
    let registry = create_registry();
    let parser = Parser::new(&registry);

    // config_a_1 widens the range, config_a does not
    let document = json!({"@module": {"_base": "config_a_1", "epsilon": -5.0}});
    assert!(parser.parse_root_and_instantiate(&document).is_ok());

    let document = json!({"@module": {"_base": "config_a", "epsilon": -5.0}});
    let err = parser.parse_root_and_instantiate(&document).unwrap_err();
    assert!(matches!(err, ConfigError::ValueOutOfRange { .. }));

    // additions are accepted outside the range
    let document = json!({"@module": {"_base": "config_a", "epsilon": -2}});
    assert!(parser.parse_root_and_instantiate(&document).is_ok());
}

#[test]
fn test_references_with_search() {
    let registry = create_registry();
    let parser = Parser::new(&registry);
    let document = json!({
        "@module": {
            "_base": "config_a",
            "_anchor": "module",
            "nested": {
                "nest_key": "@$.#1.i_am_child, @$.#2.i_am_child @lambda x, y: x+y",
            },
            "@child#1": {
                "i_am_float_child": "@module.epsilon @lambda x: x+1",
            },
            "@child#new": {"i_am_child": "new child value", "_name": "child_a"},
        },
        "_search": {
            "@module.epsilon": [3, 4, 8.0],
        },
    });

    let configs = parser.parse(&document, "").unwrap();
    assert_eq!(configs.len(), 3);
    let epsilons: Vec<f64> = configs.iter().map(epsilon).collect();
    assert_eq!(epsilons, [3.0, 4.0, 8.0]);
    for config in &configs {
        let module = &config["@module"];
        assert_eq!(
            module["nested"]["nest_key"],
            json!("child value1child value2")
        );
        assert_eq!(
            module["@child#1"]["i_am_float_child"].as_f64(),
            Some(epsilon(config) + 1.0)
        );
        assert_eq!(module["@child#new"]["i_am_child"], json!("new child value"));
        // anchors never leak into the output
        assert!(module.get("_anchor").is_none());
        assert!(module["@child#1"].get("_anchor").is_none());
    }

    let objects = parser.parse_root_and_instantiate(&document).unwrap();
    let module = objects[2].submodule("@module").unwrap();
    assert_eq!(module.get_f64("epsilon"), Some(8.0));
    assert_eq!(
        module.nested("nested").unwrap().get_str("nest_key"),
        Some("child value1child value2")
    );
    assert_eq!(
        module.submodule("#1").unwrap().get_f64("i_am_float_child"),
        Some(9.0)
    );
    assert_eq!(module.submodules_of_type("child").len(), 3);
}

#[test]
fn test_global_namespace() {
    let registry = create_registry();
    let parser = Parser::new(&registry);
    let document = json!({
        "_G": {"scale": 3},
        "@module": {
            "_base": "config_a",
            "epsilon": "@~.scale @lambda x: x * 2",
            "@child#1": {"i_am_float_child": "@_G.scale"},
        },
    });

    let configs = parser.parse(&document, "").unwrap();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0]["@module"]["epsilon"], json!(6));
    assert_eq!(configs[0]["@module"]["@child#1"]["i_am_float_child"], json!(3));
}

#[test]
fn test_slot_variant_choices() {
    let registry = create_registry();
    let parser = Parser::new(&registry);
    let document = json!({
        "@module": {
            "_base": "config_a",
            "_search": {"epsilon": [0.5, 1.5]},
        },
        "@child@child_a": {},
    });

    let configs = parser.parse(&document, "").unwrap();
    assert_eq!(configs.len(), 2);
    assert_eq!(
        configs[0]["@child@child_a"]["i_am_child"],
        json!("child value")
    );
    assert_eq!(epsilon(&configs[0]), 0.5);
    assert_eq!(epsilon(&configs[1]), 1.5);
}

#[test]
fn test_typed_parse_and_instantiate() {
    let registry = create_registry();
    let parser = Parser::new(&registry);
    let class = registry.get("module", "config_a_1").unwrap();

    // no base named: the class's own defaults are the base
    let objects = parser
        .parse_and_instantiate(&json!({"_search": {"epsilon": [1, 2]}}), &class)
        .unwrap();
    assert_eq!(objects.len(), 2);
    assert_eq!(objects[0].get_f64("epsilon"), Some(1.0));
    assert_eq!(objects[1].get_f64("epsilon"), Some(2.0));
    assert_eq!(
        objects[0].module().map(|key| key.variant.as_str()),
        Some("config_a_1")
    );
}

#[test]
fn test_circular_reference() {
    let registry = create_registry();
    let parser = Parser::new(&registry);
    let err = parser
        .parse(&json!({"a": "@$.b", "b": "@$.a"}), "")
        .unwrap_err();
    assert!(matches!(err, ConfigError::CircularReference(_)));
    assert!(err.to_string().contains("a, b"));
}

#[test]
fn test_missing_value_reported() {
    let registry = create_registry();
    let parser = Parser::new(&registry);
    let document = json!({"@module": {"_base": "config_a", "@child#1": {"i_am_child": "???"}}});

    let configs = parser.parse(&document, "").unwrap();
    let err = check_missing(&configs).unwrap_err();
    match err {
        ConfigError::ValueMissing { path, .. } => {
            assert_eq!(path, "@module.@child#1.i_am_child");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(parser.parse_root_and_instantiate(&document).is_err());
}

#[test]
fn test_resolution_errors() {
    let registry = create_registry();
    let parser = Parser::new(&registry);

    let err = parser
        .parse(&json!({"@module": {"_base": "config_z"}}), "")
        .unwrap_err();
    assert!(matches!(err, ConfigError::NoModuleFound(_)));

    let err = parser
        .parse(
            &json!({"@module": {"_base": "config_a", "_search": {"nothing": [1, 2]}}}),
            "",
        )
        .unwrap_err();
    assert!(matches!(err, ConfigError::KeyNotFound(_)));

    let err = parser
        .parse(
            &json!({"@module": {"_base": "config_a", "_search": {"epsilon": [1, 1]}}}),
            "",
        )
        .unwrap_err();
    assert!(matches!(err, ConfigError::ParserConfigRepeat { .. }));

    let err = parser
        .parse_root_and_instantiate(&json!({"@module": {"_base": "config_a", "unknown": 1}}))
        .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownField { .. }));
}
