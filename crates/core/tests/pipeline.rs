//! End-to-end pipeline runs over the in-memory registries and the
//! documents under `fixtures/`.

use formex_core::{
    expand_kpi, parse, CollectingObserver, ErrorKind, InMemoryKpiRegistry,
    InMemoryScreeningRegistry, ParserConfig, Registries, Severity,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures")
}

fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(fixtures().join(name))
        .unwrap_or_else(|e| panic!("cannot read fixture {}: {}", name, e))
}

fn load_registries() -> (InMemoryKpiRegistry, InMemoryScreeningRegistry) {
    let kpis = InMemoryKpiRegistry::load(&fixtures().join("kpis.json")).unwrap();
    let screenings = InMemoryScreeningRegistry::load(&fixtures().join("screenings.json")).unwrap();
    (kpis, screenings)
}

fn config() -> ParserConfig {
    ParserConfig::default().with_release("L21")
}

fn doc(formula: &str) -> String {
    format!("KPI definition\neNB Counter Method:\nBEGIN\n{}\nEND\n", formula)
}

fn sum(counter: &str) -> String {
    format!(
        "({c}.EmergencyCall+{c}.HighPriorityAccess+{c}.MtAccess)",
        c = counter
    )
}

// ──────────────────────────────────────────────
// Fixture documents
// ──────────────────────────────────────────────

#[test]
fn fixture_document_expands_fully() {
    let (kpis, screenings) = load_registries();
    let registries = Registries::new(&kpis, &screenings);
    let r = parse(
        &read_fixture("documents/rrc_setup_success_rate.txt"),
        &config(),
        registries,
    );

    assert_eq!(r.status(), "Formula text found.");
    assert!(r.errors().is_empty(), "{}", r.error_message());
    assert_eq!(r.severity(), Severity::Normal);
    assert_eq!(
        r.expanded_source(),
        format!(
            "100 * ({}) / ({})",
            sum("pmRrcConnEstabSucc"),
            sum("pmRrcConnEstabAtt")
        )
    );
    assert_eq!(
        r.symbol_names(),
        vec![
            "pmRrcConnEstabSucc.EmergencyCall",
            "pmRrcConnEstabSucc.HighPriorityAccess",
            "pmRrcConnEstabSucc.MtAccess",
            "pmRrcConnEstabAtt.EmergencyCall",
            "pmRrcConnEstabAtt.HighPriorityAccess",
            "pmRrcConnEstabAtt.MtAccess",
        ]
    );
    assert_eq!(r.variables().len(), 1);
    assert_eq!(r.variable_source("$att"), format!("({})", sum("pmRrcConnEstabAtt")));
}

#[test]
fn fixture_without_start_phrase_is_not_an_error() {
    let r = parse(
        &read_fixture("documents/no_formula.txt"),
        &config(),
        Registries::none(),
    );
    assert_eq!(r.status(), "Start phrase not found.");
    assert_eq!(r.severity(), Severity::Normal);
    assert!(!r.found());
    assert!(r.errors().is_empty());
    assert_eq!(r.expanded_source(), "");
    assert!(r.symbol_table().is_empty());
}

// ──────────────────────────────────────────────
// Locate
// ──────────────────────────────────────────────

#[test]
fn structural_failures_stop_before_lexing() {
    let cases = [
        ("eNB Counter Method: nothing here", "BEGIN not found."),
        ("eNB Counter Method: BEGIN A + B", "Found BEGIN but no END"),
        ("eNB Counter Method: BEGIN \n END", "Found empty BEGIN/END block"),
    ];
    for (document, status) in cases {
        let r = parse(document, &config(), Registries::none());
        assert_eq!(r.status(), status);
        assert_eq!(r.severity(), Severity::Error);
        assert!(!r.found());
        assert_eq!(r.errors().len(), 1);
        assert_eq!(r.errors()[0].kind, ErrorKind::Structural);
        assert_eq!(r.cleaned_formula(), "");
        assert_eq!(r.pass_source(0), Some(""));
        assert!(r.symbol_table().is_empty());
    }
}

#[test]
fn custom_start_phrase() {
    let document = "Definition: BEGIN A / B END";
    let r = parse(document, &ParserConfig::new("definition:"), Registries::none());
    assert!(r.found());
    assert_eq!(r.expanded_source(), "A / B");

    let r = parse(document, &config(), Registries::none());
    assert_eq!(r.status(), "Start phrase not found.");
}

#[test]
fn plain_formula_passes_through_unchanged() {
    let formula = "(pmA + pmB.x) * 100 / [pmC - 2.5] ^ 2 % 7";
    let r = parse(&doc(formula), &config(), Registries::none());
    assert!(r.errors().is_empty());
    for pass in 0..4 {
        assert_eq!(r.pass_source(pass), Some(formula));
    }
}

// ──────────────────────────────────────────────
// References
// ──────────────────────────────────────────────

#[test]
fn unknown_kpi_reference_leaves_placeholder() {
    let (kpis, screenings) = load_registries();
    let r = parse(
        &doc("A + (Formula://EnbCounterMethod/UNKNOWN)"),
        &config(),
        Registries::new(&kpis, &screenings),
    );
    assert_eq!(r.expanded_source(), "A + (Formula_for_KPI_UNKNOWN_)");
    assert_eq!(r.severity(), Severity::Warning);
    assert_eq!(r.errors().len(), 1);
    assert_eq!(r.errors()[0].kind, ErrorKind::Reference);
    assert!(r.errors()[0].message.contains("UNKNOWN"));
    assert!(r.symbol_table().contains("Formula_for_KPI_UNKNOWN_"));
}

#[test]
fn reference_without_registry_leaves_placeholder() {
    let r = parse(
        &doc("(Formula://EnbCounterMethod/DROP_RATE/$total)"),
        &config(),
        Registries::none(),
    );
    assert_eq!(r.expanded_source(), "(Formula_for_KPI_DROP_RATE_$total)");
}

#[test]
fn reference_to_a_variable_of_another_kpi() {
    let (kpis, screenings) = load_registries();
    let registries = Registries::new(&kpis, &screenings);

    let r = parse(
        &doc("(Formula://EnbCounterMethod/DROP_RATE/$total) - 1"),
        &config(),
        registries,
    );
    assert!(r.errors().is_empty(), "{}", r.error_message());
    assert_eq!(r.expanded_source(), "(pmErabRelNormal + pmErabRelAbnormal) - 1");

    let r = parse(
        &doc("(Formula://EnbCounterMethod/DROP_RATE)"),
        &config(),
        registries,
    );
    assert_eq!(
        r.expanded_source(),
        "(100 * pmErabRelAbnormal / pmErabRelNormal + pmErabRelAbnormal)"
    );
}

#[test]
fn reference_to_missing_variable_is_spliced_as_marker() {
    let (kpis, screenings) = load_registries();
    let r = parse(
        &doc("(Formula://EnbCounterMethod/DROP_RATE/$nope)"),
        &config(),
        Registries::new(&kpis, &screenings),
    );
    assert_eq!(r.expanded_source(), "(ERROR_Variable_NotFound_$nope)");
}

#[test]
fn referenced_formula_without_block_is_reported() {
    let (kpis, screenings) = load_registries();
    let r = parse(
        &doc("A * (Formula://EnbCounterMethod/BROKEN)"),
        &config(),
        Registries::new(&kpis, &screenings),
    );
    assert_eq!(r.expanded_source(), "A * (Formula_for_KPI_BROKEN_)");
    assert_eq!(r.severity(), Severity::Warning);
    assert_eq!(
        r.errors()[0].message,
        "Referenced formula BROKEN has no usable formula block: BEGIN not found."
    );
}

#[test]
fn cyclic_references_terminate() {
    let (kpis, screenings) = load_registries();
    let observer = Arc::new(CollectingObserver::new());
    let config = config().with_observer(observer.clone());
    let r = parse(
        &doc("X + (Formula://EnbCounterMethod/CYCLE_A)"),
        &config,
        Registries::new(&kpis, &screenings),
    );

    assert_eq!(
        r.expanded_source(),
        "X + (1 + (2 * (Formula_for_KPI_CYCLE_A_)))"
    );
    assert_eq!(r.error_message(), "Referenced formula CYCLE_A has errors.");

    let seen: Vec<String> = observer.errors().into_iter().map(|e| e.message).collect();
    assert!(seen.contains(
        &"Cyclic Formula reference: CYCLE_A \u{2192} CYCLE_B \u{2192} CYCLE_A".to_string()
    ));
    assert!(seen.contains(&"Referenced formula CYCLE_B has errors.".to_string()));
}

#[test]
fn expand_kpi_directly() {
    let (kpis, screenings) = load_registries();
    let registries = Registries::new(&kpis, &screenings);

    let e = expand_kpi("DROP_RATE", Some("$drops"), &config(), registries);
    assert!(e.errors.is_empty());
    assert_eq!(e.text, "pmErabRelAbnormal");

    let e = expand_kpi("RRC_ATT", None, &config(), registries);
    assert_eq!(e.text, sum("pmRrcConnEstabAtt"));

    let e = expand_kpi("MISSING", None, &config(), registries);
    assert_eq!(e.text, "Formula_for_KPI_MISSING_");
    assert_eq!(e.errors.len(), 1);
}

// ──────────────────────────────────────────────
// Variables and symbols
// ──────────────────────────────────────────────

#[test]
fn variable_substitution_is_literal() {
    let r = parse(&doc("$X*3 $X=1+2"), &config(), Registries::none());
    assert_eq!(r.expanded_source(), "1+2*3");
    assert!(r.errors().is_empty());
}

#[test]
fn variable_defined_before_its_user_stays_undefined() {
    let r = parse(&doc("$Y*2 $X=1 $Y=$X+2"), &config(), Registries::none());
    assert_eq!(r.expanded_source(), "$X+2*2");
    assert_eq!(r.error_message(), "Variable not defined ($X)");
    assert_eq!(r.errors()[0].kind, ErrorKind::Variable);
    assert!(!r.symbol_table().contains("$X"));
    assert_eq!(r.severity(), Severity::Warning);
}

#[test]
fn undefined_variable_is_reported() {
    let r = parse(&doc("pmA / $missing"), &config(), Registries::none());
    assert_eq!(r.error_message(), "Variable not defined ($missing)");
    assert_eq!(r.symbol_names(), vec!["pmA"]);
}

// ──────────────────────────────────────────────
// Summations
// ──────────────────────────────────────────────

#[test]
fn summation_default_range_uses_latest_version() {
    let (kpis, screenings) = load_registries();
    let r = parse(
        &doc("\u{2211}pmRrcConnEstabAtt / 2"),
        &config(),
        Registries::new(&kpis, &screenings),
    );
    assert_eq!(r.expanded_source(), format!("{} / 2", sum("pmRrcConnEstabAtt")));
    assert_eq!(
        r.error_message(),
        "Invalid Screening IDs found: 3, 4, 5, 6, 7, 8"
    );
    assert_eq!(r.formula(), "\u{2211}pmRrcConnEstabAtt / 2");
}

#[test]
fn summation_pinned_version_and_names() {
    let (kpis, screenings) = load_registries();
    let config = config().with_version(formex_core::VersionPolicy::Pinned("1".into()));
    let r = parse(
        &doc("~pmRrcConnEstabAtt(Emergency)"),
        &config,
        Registries::new(&kpis, &screenings),
    );
    assert!(r.errors().is_empty(), "{}", r.error_message());
    assert_eq!(r.expanded_source(), "(pmRrcConnEstabAtt.Emergency)");
}

#[test]
fn summation_of_unknown_counter() {
    let (kpis, screenings) = load_registries();
    let r = parse(
        &doc("A + ~pmUnknown(1, 2)"),
        &config(),
        Registries::new(&kpis, &screenings),
    );
    assert_eq!(r.expanded_source(), "A + ");
    assert_eq!(r.error_message(), "pmUnknown not in PM SRS for release L21.");
}

#[test]
fn summation_range_after_space_survives_cleaning() {
    let (kpis, screenings) = load_registries();
    let r = parse(
        &doc("\u{2211}pmRrcConnEstabAtt (0-1)"),
        &config(),
        Registries::new(&kpis, &screenings),
    );
    assert!(r.errors().is_empty(), "{}", r.error_message());
    assert_eq!(
        r.expanded_source(),
        "(pmRrcConnEstabAtt.EmergencyCall+pmRrcConnEstabAtt.HighPriorityAccess)"
    );
}

#[test]
fn reversed_summation_range_is_reported() {
    let (kpis, screenings) = load_registries();
    let r = parse(
        &doc("A + ~pmRrcConnEstabAtt(2-0)"),
        &config(),
        Registries::new(&kpis, &screenings),
    );
    assert_eq!(r.expanded_source(), "A + ");
    assert_eq!(r.error_message(), "Reversed summation range: 2-0");
    assert_eq!(r.severity(), Severity::Warning);
}

// ──────────────────────────────────────────────
// Diagnostics
// ──────────────────────────────────────────────

#[test]
fn stray_hash_is_a_lexical_error_but_the_run_completes() {
    let r = parse(&doc("A # B"), &config(), Registries::none());

    assert_eq!(r.status(), "Formula text found.");
    assert_eq!(r.errors().len(), 1, "{}", r.error_message());
    let e = &r.errors()[0];
    assert_eq!(e.kind, ErrorKind::Lexical);
    assert_eq!(e.pass, 0);
    assert!(e.message.starts_with("## must be preceded"));
    assert_eq!(r.severity(), Severity::Error);
    assert_eq!(r.expanded_source(), "A # B");
    assert_eq!(r.symbol_names(), vec!["A", "B"]);

    let relaxed = parse(
        &doc("A # B"),
        &config().with_relaxed(true),
        Registries::none(),
    );
    assert_eq!(relaxed.errors().len(), 1);
    assert_eq!(relaxed.severity(), Severity::Warning);
}

#[test]
fn observer_sees_every_pass_and_error() {
    let observer = Arc::new(CollectingObserver::new());
    let config = config().with_observer(observer.clone());
    let r = parse(&doc("$a + $b $a = pmA"), &config, Registries::none());

    let passes: Vec<u8> = observer.passes().iter().map(|(p, _)| *p).collect();
    assert_eq!(passes, vec![0, 1, 2, 3]);
    assert_eq!(observer.passes()[3].1, "pmA + $b");
    assert_eq!(observer.errors(), r.errors().to_vec());
}

#[test]
fn outcome_serializes_for_tooling() {
    let r = parse(&doc("$a * 2 $a = pmA"), &config(), Registries::none());
    let json = serde_json::to_value(r.outcome()).unwrap();
    assert_eq!(json["status"], "Formula text found.");
    assert_eq!(json["severity"], "normal");
    assert_eq!(json["expanded"], "pmA * 2");
    assert_eq!(json["variables"][0]["name"], "$a");
    assert_eq!(json["symbols"][0], "pmA");
    assert_eq!(json["passes"].as_array().unwrap().len(), 4);
}
