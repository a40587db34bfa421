use crate::config::GatewayConfig;
use crate::execution::{LogAction, PromptGateway};
use crate::template::Variable;

fn gateway() -> PromptGateway {
    PromptGateway::new(&GatewayConfig::default())
}

#[test]
fn assembly_substitutes_then_inlines() {
    let gw = gateway();
    let (final_prompt, logs) = gw.build_final_prompt(
        "Summarize for {name}:",
        &[Variable::new("name", "Acme")],
        &["first doc".to_string(), "second doc".to_string()],
    );

    assert!(final_prompt.starts_with("Summarize for Acme:"));
    assert!(final_prompt.contains("--- DOCUMENT 1 ---\nfirst doc\n--- END DOCUMENT 1 ---"));
    assert!(final_prompt.contains("--- DOCUMENT 2 ---\nsecond doc\n--- END DOCUMENT 2 ---"));

    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].action, LogAction::VariableSubstitution);
    assert!(logs[0].success);
    assert!(logs[0].details.contains("1 variable(s)"));
    assert!(logs[0].details.contains("name"));
    assert_eq!(logs[1].action, LogAction::FileProcessing);
    assert!(logs[1].details.contains("2 document(s)"));
}

#[test]
fn assembly_without_files_logs_substitution_only() {
    let gw = gateway();
    let (final_prompt, logs) =
        gw.build_final_prompt("Hello {who}", &[Variable::new("who", "world")], &[]);

    assert_eq!(final_prompt, "Hello world");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, LogAction::VariableSubstitution);
}

#[test]
fn assembly_flags_catalog_sourced_variables() {
    let gw = gateway();
    let mut sector = Variable::new("sector", "energy");
    sector.from_catalog = true;

    let (_, logs) = gw.build_final_prompt(
        "{name} / {sector}",
        &[Variable::new("name", "Acme"), sector],
        &[],
    );
    assert!(logs[0].details.contains("sector (catalog)"));
    assert!(!logs[0].details.contains("name (catalog)"));
}

#[test]
fn validate_reports_missing_through_gateway() {
    let gw = gateway();
    let report = gw.validate(
        "Hello {name}, sector {sector}",
        &[Variable::new("name", "Acme")],
    );
    assert!(!report.is_valid);
    assert_eq!(report.missing, vec!["sector".to_string()]);
}
