use csspipe_core::{
    classify, specificity, tokenize, ClassifierTable, MinificationAdapter, MinifierConfig,
};

const FIXTURE: &str = r#"
/* Theme */
:root { --brand: #0af; --gap: 8px; }
*, *::before, *::after { box-sizing: border-box; }
html, body { margin: 0; }
body { font: 16px/1.5 system-ui, sans-serif; }
h1 { font-size: 2.5rem; }
.container { max-width: 1200px; margin: 0 auto; }
.navbar { display: flex; gap: var(--gap); }
.btn-primary { background: var(--brand); content: "}"; }
.hero { background: linear-gradient( to right , #fff 0% , #000 100% ); }
.mt-2 { margin-top: .5rem; }
.fade-in { animation: fade 300ms ease-in; }
@keyframes fade { from { opacity: 0; } to { opacity: 1; } }
@media (max-width: 768px) { .navbar { flex-direction: column; } }
.one-off { color: rebeccapurple; }
"#;

fn without_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

// ── Tokenizer ─────────────────────────────────────────────────────────────

#[test]
fn tokenizer_covers_every_non_whitespace_character() {
    let rules = tokenize(FIXTURE);
    let joined: String = rules.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(without_whitespace(&joined), without_whitespace(FIXTURE));
    assert!(rules.iter().all(|r| !r.partial));
}

#[test]
fn tokenizer_rules_are_brace_balanced() {
    for rule in tokenize(FIXTURE) {
        let subject = rule.subject().replace("\"}\"", "");
        let open = subject.matches('{').count();
        let close = subject.matches('}').count();
        assert_eq!(open, close, "unbalanced rule: {}", rule.text);
        assert!(subject.ends_with('}'));
    }
}

// ── Classifier ────────────────────────────────────────────────────────────

#[test]
fn classification_is_exhaustive_and_disjoint() {
    let table = ClassifierTable::builtin().expect("builtin table");
    let rules = tokenize(FIXTURE);
    let total = rules.len();
    let set = classify(&table, rules.clone());

    assert_eq!(set.total_rules(), total);
    for rule in &rules {
        let homes = set
            .iter()
            .filter(|(_, module_rules)| module_rules.contains(rule))
            .count();
        assert_eq!(homes, 1, "rule placed {} times: {}", homes, rule.text);
    }
}

// ── Specificity ───────────────────────────────────────────────────────────

#[test]
fn specificity_is_monotonic_across_selector_kinds() {
    assert!(specificity("#a") > specificity(".a"));
    assert!(specificity(".a") > specificity("a"));
    assert!(specificity("#a .b") > specificity("#a"));
}

// ── Minification ──────────────────────────────────────────────────────────

#[test]
fn minifying_twice_does_not_re_expand() {
    let adapter = MinificationAdapter::new(MinifierConfig::full());
    let (once, _) = adapter.minify_text(FIXTURE).expect("first pass");
    let (twice, _) = adapter.minify_text(&once).expect("second pass");

    assert!(once.len() < FIXTURE.len());
    assert!(twice.len() <= once.len());
    assert!(once.len() - twice.len() <= 2);
}

#[test]
fn minifying_keeps_keyframes_and_media() {
    let adapter = MinificationAdapter::new(MinifierConfig::full());
    let (code, _) = adapter.minify_text(FIXTURE).expect("minify");
    assert!(code.contains("@keyframes fade"));
    assert!(code.contains("@media"));
    assert!(code.contains("--brand"));
}
