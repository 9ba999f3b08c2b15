use serial_test::serial;

use goja_server::config::{StudyConfig, API_KEY_ENV};
use goja_server::AppError;

fn full_toml() -> &'static str {
    r#"
[agent]
api_base = "https://llm.example.org/v1"
model = "study-model"
temperature = 0.2
system_prompt = "You are a careful assistant."

[cases]
file = "data/cases.csv"
n = 12
columns = ["age", "income", "risk"]

[content]
intake = "Welcome to the study."
done = "Thank you for participating."
"#
}

#[test]
fn parses_full_configuration() {
    let config = StudyConfig::from_toml_str(full_toml()).unwrap();
    assert_eq!(config.agent.api_base, "https://llm.example.org/v1");
    assert_eq!(config.agent.model, "study-model");
    assert!(config.case_rating_enabled());

    let cases = config.cases.as_ref().unwrap();
    assert_eq!(cases.n, 12);
    assert_eq!(cases.columns.as_ref().unwrap().len(), 3);
    assert_eq!(
        config.content.get("done").map(String::as_str),
        Some("Thank you for participating.")
    );
}

#[test]
fn minimal_configuration_uses_defaults() {
    let config = StudyConfig::from_toml_str("[agent]\n").unwrap();
    assert_eq!(config.agent.api_base, "https://api.openai.com/v1");
    assert!(!config.agent.model.is_empty());
    assert!(config.agent.system_prompt.is_none());
    assert!(!config.case_rating_enabled());
    assert!(config.content.is_empty());
}

#[test]
fn rejects_zero_case_limit() {
    let toml = "[agent]\n[cases]\nfile = \"cases.csv\"\nn = 0\n";
    let result = StudyConfig::from_toml_str(toml);
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn rejects_empty_column_list() {
    let toml = "[agent]\n[cases]\nfile = \"cases.csv\"\nn = 3\ncolumns = []\n";
    let result = StudyConfig::from_toml_str(toml);
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn rejects_blank_model() {
    let toml = "[agent]\nmodel = \"  \"\n";
    let result = StudyConfig::from_toml_str(toml);
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn clamps_case_limit_to_dataset_size() {
    let toml = "[agent]\n[cases]\nfile = \"cases.csv\"\nn = 50\n";
    let mut config = StudyConfig::from_toml_str(toml).unwrap();
    config.clamp_case_limit(7);
    assert_eq!(config.cases.unwrap().n, 7);
}

#[test]
fn clamp_leaves_smaller_limit_alone() {
    let toml = "[agent]\n[cases]\nfile = \"cases.csv\"\nn = 3\n";
    let mut config = StudyConfig::from_toml_str(toml).unwrap();
    config.clamp_case_limit(7);
    assert_eq!(config.cases.unwrap().n, 3);
}

#[test]
#[serial]
fn load_credentials_requires_env_var() {
    std::env::remove_var(API_KEY_ENV);
    let mut config = StudyConfig::from_toml_str("[agent]\n").unwrap();
    assert!(matches!(config.load_credentials(), Err(AppError::Config(_))));
}

#[test]
#[serial]
fn load_credentials_reads_env_var() {
    std::env::set_var(API_KEY_ENV, "sk-test-key");
    let mut config = StudyConfig::from_toml_str("[agent]\n").unwrap();
    config.load_credentials().unwrap();
    assert_eq!(config.agent.api_key, "sk-test-key");
    std::env::remove_var(API_KEY_ENV);
}
