use tyco::load_text;

fn main() {
    let tyco_data = r#"
str environment: production

Server:
 *str name:
  int port:
  str url: "https://{name}.{global.environment}.example.com:{port}"
  - api, 3000
  - web, 443
"#;

    match load_text(tyco_data) {
        Ok(ctx) => {
            let json_output = ctx.to_json().unwrap();
            println!("Successfully loaded Tyco to JSON:\n{json_output}");
        }
        Err(e) => {
            eprintln!("Failed to load Tyco: {e:?}");
        }
    }
}
