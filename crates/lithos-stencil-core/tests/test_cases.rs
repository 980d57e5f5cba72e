// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::path::Path;

use lithos_stencil_core::{environment_builder, Environment};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct FilterCase {
    name: String,
    template: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    expected: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn load_cases() -> Vec<FilterCase> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../test-cases/lithos-stencil-core.json");
    let raw = std::fs::read_to_string(&path)
        .unwrap_or_else(|err| panic!("reading {}: {err}", path.display()));
    serde_json::from_str(&raw).expect("invalid test cases json")
}

fn run_case(env: &Environment, case: &FilterCase) -> Result<String, String> {
    let template = env
        .template_from_str(&case.name, &case.template)
        .map_err(|err| format!("parse failed: {err}"))?;
    env.render(&template, &case.data).map_err(|err| err.to_string())
}

#[test]
fn stencil_filters_match_case_table() {
    let env = environment_builder().build();
    let cases = load_cases();
    assert!(!cases.is_empty());

    for case in &cases {
        let result = run_case(&env, case);
        match (&case.error, result) {
            (Some(fragment), Err(message)) => assert!(
                message.contains(fragment.as_str()),
                "{}: expected error containing '{fragment}', got '{message}'",
                case.name
            ),
            (Some(fragment), Ok(output)) => {
                panic!("{}: expected error '{fragment}' but rendered '{output}'", case.name)
            }
            (None, Ok(output)) => assert_eq!(
                output,
                case.expected.clone().unwrap_or_default(),
                "case {} rendered incorrectly",
                case.name
            ),
            (None, Err(message)) => panic!("{}: {message}", case.name),
        }
    }
}
