// End-to-end tests: documents in, serialized trees out
use serde_json::json;
use tyco::load_text;

fn to_json(source: &str) -> serde_json::Value {
    match load_text(source) {
        Ok(ctx) => serde_json::to_value(&ctx).unwrap(),
        Err(tyco::TycoError::Parse(err)) => panic!("{}", err.render()),
        Err(err) => panic!("{err}"),
    }
}

mod documents {
    use super::*;

    #[test]
    fn test_globals_and_struct_rows() {
        let source = "str env: production\nServer:\n *str name:\n  int port:\n  - api, 3000\n";
        assert_eq!(
            to_json(source),
            json!({
                "env": "production",
                "Server": [{"name": "api", "port": 3000}],
            })
        );
    }

    #[test]
    fn test_scalar_types() {
        let source = r#"
int hex: 0x1F
int bin: 0b101
int big: 1_000_000
float ratio: 1.5e3
decimal price: 19.99
bool enabled: true
?int missing: null
date day: 2024-01-15
time at: 14:30:00
datetime deployed: 2024-03-01 12:30:00Z
datetime local: 2024-03-01T08:15
"#;
        assert_eq!(
            to_json(source),
            json!({
                "hex": 31,
                "bin": 5,
                "big": 1_000_000,
                "ratio": 1500.0,
                "price": 19.99,
                "enabled": true,
                "missing": null,
                "day": "2024-01-15",
                "at": "14:30:00",
                "deployed": "2024-03-01T12:30:00+00:00",
                "local": "2024-03-01T08:15:00",
            })
        );
    }

    #[test]
    fn test_decimals_keep_full_precision() {
        use bigdecimal::BigDecimal;
        use std::str::FromStr;
        use tyco::{ast::Literal, Native, Registry};

        let source = "\
decimal whole: 123456789012345678901234567890
decimal fraction: 0.1234567890123456789012345678901
";
        let ctx = load_text(source).unwrap();
        let globals = ctx.globals_object(&Registry::new()).unwrap();
        for (name, text) in [
            ("whole", "123456789012345678901234567890"),
            ("fraction", "0.1234567890123456789012345678901"),
        ] {
            let Some(Native::Scalar(Literal::Decimal(d))) = globals.get(name) else {
                panic!("expected a decimal for {name}");
            };
            let (digits, _) = d.as_bigint_and_exponent();
            assert_eq!(digits.to_string(), text.replace("0.", ""));
            assert_eq!(d, &BigDecimal::from_str(text).unwrap());
        }
        assert_eq!(
            to_json(source)["fraction"],
            json!(0.123_456_789_012_345_68)
        );
    }

    #[test]
    fn test_quoted_strings() {
        let source = "str plain: hello world\nstr quoted: \"a, b\"\nstr single: 'x # not a comment'\nstr tab: \"x\\ty\"\n";
        assert_eq!(
            to_json(source),
            json!({
                "plain": "hello world",
                "quoted": "a, b",
                "single": "x # not a comment",
                "tab": "x\ty",
            })
        );
    }

    #[test]
    fn test_triple_quoted_string_spans_lines() {
        let source = "str text: \"\"\"\nfirst\n  second\"\"\"\nint after: 1\n";
        assert_eq!(
            to_json(source),
            json!({"text": "first\n  second", "after": 1})
        );
    }

    #[test]
    fn test_arrays() {
        let source = "int[] ports: [80, 443]\nstr[] empty: []\nstr[] names: [\n  alpha,  # first\n  'beta',\n]\n";
        assert_eq!(
            to_json(source),
            json!({"ports": [80, 443], "empty": [], "names": ["alpha", "beta"]})
        );
    }

    #[test]
    fn test_inline_instances_and_keyed_arguments() {
        let source = "\
Point:
 int x:
 int y: 0
Shape:
 *str name:
  Point origin:
  Point[] corners: []
  - square, Point(1), [Point(0, 0), Point(y: 2, x: 2)]
  - dot, origin: Point(x: 5, y: 5), name: unused
";
        let err = load_text(source).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Attribute 'name' of 'Shape' is supplied more than once"
        );

        let source = source.replace(", name: unused", "");
        assert_eq!(
            to_json(&source),
            json!({
                "Shape": [
                    {
                        "name": "square",
                        "origin": {"x": 1, "y": 0},
                        "corners": [{"x": 0, "y": 0}, {"x": 2, "y": 2}],
                    },
                    {"name": "dot", "origin": {"x": 5, "y": 5}, "corners": []},
                ]
            })
        );
    }

    #[test]
    fn test_default_overrides_within_a_file() {
        let source = "\
P:
 *str name:
  int port: 80
  - a
  port: 90
  - b
  - c, 1
";
        assert_eq!(
            to_json(source),
            json!({"P": [
                {"name": "a", "port": 80},
                {"name": "b", "port": 90},
                {"name": "c", "port": 1},
            ]})
        );
    }

    #[test]
    fn test_cleared_default_makes_attribute_required() {
        let source = "P:\n *str name:\n  int port: 80\n  - a\n  port:\n  - b\n";
        let err = load_text(source).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid attribute port for struct 'P': value is required and no default is defined"
        );
    }

    #[test]
    fn test_row_continuation() {
        let source = "P:\n *str name:\n  int port:\n  - web, \\\n      8080\n";
        assert_eq!(to_json(source), json!({"P": [{"name": "web", "port": 8080}]}));
    }

    #[test]
    fn test_comments_and_blank_lines_are_ignored() {
        let source = "# header\n\nstr a: x  # trailing\n   \n# footer\n";
        assert_eq!(to_json(source), json!({"a": "x"}));
    }

    #[test]
    fn test_second_block_appends_rows() {
        let source = "S:\n *int id:\n  - 1\nint between: 0\nS:\n  - 2\n";
        assert_eq!(
            to_json(source),
            json!({"between": 0, "S": [{"id": 1}, {"id": 2}]})
        );
    }

    #[test]
    fn test_load_is_deterministic() {
        let source = "str env: prod\nS:\n *str name:\n  str url: \"{name}.{global.env}\"\n  - a\n  - b\n";
        let first = load_text(source).unwrap().to_json().unwrap();
        let second = load_text(source).unwrap().to_json().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_yaml_output_preserves_declaration_order() {
        let source = "str zeta: last\nstr alpha: first\n";
        let yaml = load_text(source).unwrap().to_yaml().unwrap();
        assert_eq!(yaml, "zeta: last\nalpha: first\n");
    }
}

mod references {
    use super::*;

    #[test]
    fn test_forward_reference_resolves() {
        let source = "\
Service:
 *str name:
  Database db:
  - api, Database(primary)
Database:
 *str name:
  str host:
  - primary, db.internal
";
        assert_eq!(
            to_json(source),
            json!({
                "Service": [{"name": "api", "db": {"name": "primary", "host": "db.internal"}}],
                "Database": [{"name": "primary", "host": "db.internal"}],
            })
        );
    }

    #[test]
    fn test_composite_primary_key() {
        let source = "\
Port:
 *str host:
 *int number:
  str label:
  - web, 80, http
  - web, 443, https
Port chosen: Port(web, number: 443)
";
        let value = to_json(source);
        assert_eq!(value["chosen"], json!({"host": "web", "number": 443, "label": "https"}));
    }

    #[test]
    fn test_reference_in_default_is_copied_per_instance() {
        let source = "\
Region:
 *str code:
  - eu
  - us
Database:
 *str name:
  Region region: Region(eu)
  - primary
  - analytics, Region(us)
";
        let value = to_json(source);
        assert_eq!(value["Database"][0]["region"], json!({"code": "eu"}));
        assert_eq!(value["Database"][1]["region"], json!({"code": "us"}));
    }

    #[test]
    fn test_reference_cycle_serializes_primary_keys_only() {
        let source = "\
A:
 *str name:
  B b:
  - a1, B(b1)
B:
 *str name:
  A a:
  - b1, A(a1)
";
        let value = to_json(source);
        assert_eq!(
            value["A"],
            json!([{"name": "a1", "b": {"name": "b1", "a": {"name": "a1"}}}])
        );
    }

    #[test]
    fn test_duplicate_primary_key() {
        let source = "Server:\n *str name:\n  int port:\n  - web, 1\n  - web, 2\n";
        let tyco::TycoError::Parse(err) = load_text(source).unwrap_err() else {
            panic!("expected a parse error");
        };
        assert_eq!(err.message(), "Server with primary key ('web',) already exists");
        assert_eq!(err.location().unwrap().row, 5);
    }
}

mod templates {
    use super::*;

    #[test]
    fn test_global_template() {
        assert_eq!(
            to_json("str a: \"x\"\nstr b: \"{a}-{a}\"\n"),
            json!({"a": "x", "b": "x-x"})
        );
    }

    #[test]
    fn test_literal_strings_are_not_interpolated() {
        let source = "str a: x\nstr lit: '{a}'\nstr interp: \"{a}\"\nstr raw: '''{a}\\n'''\n";
        assert_eq!(
            to_json(source),
            json!({"a": "x", "lit": "{a}", "interp": "x", "raw": "{a}\\n"})
        );
    }

    #[test]
    fn test_instance_fields_and_integers() {
        let source = "\
Server:
 *str name:
  int port:
  str url: \"http://{name}:{port}\"
  - api, 3000
";
        assert_eq!(to_json(source)["Server"][0]["url"], json!("http://api:3000"));
    }

    #[test]
    fn test_parent_scope() {
        let source = "\
Address:
  str city:
  str label: \"{..name} lives in {city}\"
Person:
 *str name:
  Address address:
  - alice, Address(Paris)
";
        assert_eq!(
            to_json(source)["Person"][0]["address"]["label"],
            json!("alice lives in Paris")
        );
    }

    #[test]
    fn test_global_scope_escape() {
        let source = "\
str name: global-name
Item:
 *str name:
  str local: \"{name}\"
  str outer: \"{global.name}\"
  - item
";
        let value = to_json(source);
        assert_eq!(value["Item"][0]["local"], json!("item"));
        assert_eq!(value["Item"][0]["outer"], json!("global-name"));
    }

    #[test]
    fn test_field_named_global_shadows_escape() {
        let source = "\
str region: eu
Zone:
 *str id:
  str global: local
  str which: \"{global}\"
  - z1
";
        assert_eq!(to_json(source)["Zone"][0]["which"], json!("local"));
    }

    #[test]
    fn test_template_reads_through_reference() {
        let source = "\
Host:
 *str hostname:
  - db1
Service:
 *str name:
  Host host:
  str dsn: \"{name}@{host.hostname}\"
  - billing, Host(db1)
";
        assert_eq!(to_json(source)["Service"][0]["dsn"], json!("billing@db1"));
    }

    #[test]
    fn test_unicode_escape_after_substitution() {
        let source = "str who: world\nstr greeting: \"hello {who} \\u263A\"\n";
        assert_eq!(to_json(source)["greeting"], json!("hello world \u{263A}"));
    }

    #[test]
    fn test_braces_without_identifier_are_kept() {
        let source = "str a: \"{} and { x }\"\n";
        assert_eq!(to_json(source)["a"], json!("{} and { x }"));
    }
}
