//! Integration tests for expansion, un-expansion and routing
//!
//! These walk the full pre-translation / post-translation cycle the way the
//! translation pipeline drives it: expand, let a "translator" rewrite the text,
//! then un-expand the translated output.

use macroswap_core::{Config, DiagnosticCode};
use macroswap_expander::{
    Expander, ExpansionSession, FileState, MacroProcessor, ParamConvention, Router, TieBreak,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const DOLLAR_BRACE: &str = r"\$\{(\w+)\}";

fn param_expander() -> Arc<Expander> {
    let convention = ParamConvention::default();
    Arc::new(
        Expander::builder(DOLLAR_BRACE)
            .name("params")
            .generator(convention.clone())
            .un_generator(convention)
            .build()
            .unwrap(),
    )
}

/// Stand-in for the dialect translator: upper-cases keywords, keeps everything else
fn translate(text: &str) -> String {
    text.replace("select", "SELECT")
        .replace("from", "FROM")
        .replace("where", "WHERE")
}

#[test]
fn round_trip_through_translation() {
    let expander = Expander::builder(DOLLAR_BRACE)
        .mapping([("foo", "BAR")])
        .build()
        .unwrap();
    let mut session = ExpansionSession::new();

    let expanded = expander.expand(&mut session, "q.sql", "select ${foo} from t");
    assert_eq!(expanded, "select BAR from t");

    let translated = translate(&expanded);
    assert_eq!(
        expander.un_expand(&mut session, "q.sql", &translated),
        "SELECT ${foo} FROM t"
    );
}

#[test]
fn custom_un_generator_recovers_inner_identifier() {
    let expander = param_expander();
    let mut session = ExpansionSession::new();

    let expanded = expander.expand(&mut session, "q.sql", "select * from t where id = ${customer_id}");
    assert_eq!(expanded, "select * from t where id = PARAM_customer_id_PARAM");

    let translated = translate(&expanded);
    // the default convention restores `{name}` without the leading `$`
    assert_eq!(
        expander.un_expand(&mut session, "q.sql", &translated),
        "SELECT * FROM t WHERE id = {customer_id}"
    );
    assert!(session.unmapped("q.sql").unwrap().contains("customer_id"));
}

#[test]
fn collision_is_reported_but_still_restored() {
    let expander = param_expander();
    let mut session = ExpansionSession::new();

    let expanded = expander.expand(&mut session, "q.sql", "select ${Foo}, ${foo} from t");
    assert_eq!(expanded, "select PARAM_foo_PARAM, PARAM_foo_PARAM from t");

    let restored = expander.un_expand(&mut session, "q.sql", &expanded);
    assert!(!restored.contains("PARAM_foo_PARAM"));
    assert_eq!(restored, "select {foo}, {foo} from t");

    let codes: Vec<DiagnosticCode> = session.diagnostics().map(|d| d.code).collect();
    assert_eq!(codes, vec![DiagnosticCode::MacroAmbiguousReversal]);
}

#[test]
fn files_are_tracked_separately() {
    let expander = param_expander();
    let mut session = ExpansionSession::new();

    expander.expand(&mut session, "a.sql", "${x}");
    expander.expand(&mut session, "b.sql", "${y}");

    assert_eq!(session.len(), 2);
    assert!(session.reverse_entry("a.sql", "PARAM_y_PARAM").is_none());
    // b.sql never produced PARAM_x_PARAM, so it is left in place there
    assert_eq!(
        expander.un_expand(&mut session, "b.sql", "PARAM_x_PARAM PARAM_y_PARAM"),
        "PARAM_x_PARAM {y}"
    );
}

#[test]
fn router_dispatch_and_passthrough() {
    let expander_a = Arc::new(
        Expander::builder(DOLLAR_BRACE)
            .name("a")
            .mapping([("foo", "BAR")])
            .build()
            .unwrap(),
    );
    let router = Router::default().route("*.sql", expander_a).unwrap();
    let mut session = ExpansionSession::new();

    assert_eq!(router.expand(&mut session, "readme.md", "${foo}"), "${foo}");
    assert_eq!(router.un_expand(&mut session, "readme.md", "BAR"), "BAR");

    assert_eq!(router.expand(&mut session, "query.sql", "${foo}"), "BAR");
    assert_eq!(router.un_expand(&mut session, "query.sql", "BAR"), "${foo}");
}

#[test]
fn routing_ambiguity_still_picks_an_expander() {
    for tie_break in [TieBreak::FirstRegistered, TieBreak::LastRegistered] {
        let router = Router::new(tie_break)
            .route("*.sql", param_expander())
            .unwrap()
            .route("a.*", param_expander())
            .unwrap();
        let mut session = ExpansionSession::new();

        assert!(router.choose_expander("a.sql").is_some());
        router.expand(&mut session, "a.sql", "${x}");

        let diagnostic = session
            .diagnostics()
            .find(|d| d.code == DiagnosticCode::RouteAmbiguous)
            .unwrap();
        assert_eq!(diagnostic.location.as_ref().unwrap().file, "a.sql");
    }
}

#[test]
fn file_shards_can_be_processed_on_separate_threads() {
    let expander = param_expander();
    let inputs = vec![
        ("a.sql".to_string(), "select ${a}".to_string()),
        ("b.sql".to_string(), "select ${b}, ${c}".to_string()),
        ("c.sql".to_string(), "select 1".to_string()),
    ];

    let results: Vec<(String, FileState, String)> = std::thread::scope(|scope| {
        let handles: Vec<_> = inputs
            .iter()
            .map(|(file_id, text)| {
                let expander = Arc::clone(&expander);
                scope.spawn(move || {
                    let mut state = FileState::default();
                    let expanded = expander.expand_file(&mut state, file_id, text);
                    (file_id.clone(), state, expanded)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut session = ExpansionSession::new();
    for (file_id, state, _) in &results {
        session.insert_file(file_id.as_str(), state.clone());
    }

    assert_eq!(session.file_ids().collect::<Vec<_>>(), vec!["a.sql", "b.sql"]);
    assert_eq!(results[1].2, "select PARAM_b_PARAM, PARAM_c_PARAM");
    assert_eq!(
        expander.un_expand(&mut session, "b.sql", &results[1].2),
        "select {b}, {c}"
    );
}

#[test]
fn directory_round_trip_from_config() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("input");
    let expanded_dir = root.path().join("expanded");
    let restored_dir = root.path().join("restored");

    std::fs::create_dir_all(input.join("nested")).unwrap();
    std::fs::write(input.join("q.sql"), "select * from ${env}.orders where id = ${order_id}").unwrap();
    std::fs::write(input.join("nested/job.bteq"), ".run ${script}").unwrap();
    std::fs::write(input.join("notes.md"), "uses ${env}").unwrap();
    std::fs::write(input.join("rows.csv"), "${env},1").unwrap();

    let config = Config::from_toml(
        r#"
[[expanders]]
name = "dollar-brace"
pattern = '\$\{(\w+)\}'
files = ["*.sql", "*.bteq"]
generator = { kind = "param" }
un_generator = { kind = "param", open = "${" }

[expanders.mapping]
env = "PROD"
"#,
    )
    .unwrap();
    let processor = MacroProcessor::from_config(&config).unwrap();
    let mut session = ExpansionSession::new();

    let stats = processor.preprocess(&mut session, &input, &expanded_dir).unwrap();
    assert_eq!(stats.files_seen, 4);
    assert_eq!(stats.files_transformed, 2);
    assert_eq!(stats.files_copied, 1);

    assert_eq!(
        std::fs::read_to_string(expanded_dir.join("q.sql")).unwrap(),
        "select * from PROD.orders where id = PARAM_order_id_PARAM"
    );
    assert_eq!(
        std::fs::read_to_string(expanded_dir.join("nested/job.bteq")).unwrap(),
        ".run PARAM_script_PARAM"
    );
    assert_eq!(std::fs::read_to_string(expanded_dir.join("notes.md")).unwrap(), "uses ${env}");

    // persist between the two stages, as separate CLI runs would
    let session_path = root.path().join("session.json");
    session.save_to_file(&session_path).unwrap();
    let mut session = ExpansionSession::from_file(&session_path).unwrap();

    processor.postprocess(&mut session, &expanded_dir, &restored_dir).unwrap();
    assert_eq!(
        std::fs::read_to_string(restored_dir.join("q.sql")).unwrap(),
        "select * from ${env}.orders where id = ${order_id}"
    );
    assert_eq!(
        std::fs::read_to_string(restored_dir.join("nested/job.bteq")).unwrap(),
        ".run ${script}"
    );
    assert_eq!(std::fs::read_to_string(restored_dir.join("rows.csv")).unwrap(), "${env},1");
}
