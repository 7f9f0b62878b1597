//! Assigns each rule to exactly one semantic module.
//!
//! Classification is first-match over an ordered, immutable table of
//! `(ModuleName, patterns)` entries. Rules that match nothing land in
//! [`DEFAULT_MODULE`].

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StyleError};
use crate::tokenizer::Rule;

/// Semantic stylesheet buckets.
///
/// Declaration order is the aggregation (import) order, which encodes the
/// assumed cascade precedence: variables first, responsive overrides last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleName {
    Variables,
    Reset,
    Base,
    Layout,
    Components,
    Utilities,
    Animations,
    Responsive,
}

impl ModuleName {
    /// Fixed import order used when writing the aggregator file.
    pub const IMPORT_ORDER: [ModuleName; 8] = [
        ModuleName::Variables,
        ModuleName::Reset,
        ModuleName::Base,
        ModuleName::Layout,
        ModuleName::Components,
        ModuleName::Utilities,
        ModuleName::Animations,
        ModuleName::Responsive,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModuleName::Variables => "variables",
            ModuleName::Reset => "reset",
            ModuleName::Base => "base",
            ModuleName::Layout => "layout",
            ModuleName::Components => "components",
            ModuleName::Utilities => "utilities",
            ModuleName::Animations => "animations",
            ModuleName::Responsive => "responsive",
        }
    }

    /// File name of the module partial, e.g. `_reset.css`.
    pub fn file_name(&self) -> String {
        format!("_{}.css", self.name())
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Module that receives every rule no pattern matched.
pub const DEFAULT_MODULE: ModuleName = ModuleName::Components;

/// One row of the classifier table.
#[derive(Debug, Clone)]
pub struct ClassifierEntry {
    pub module: ModuleName,
    pub patterns: Vec<Regex>,
}

/// Ordered pattern table. Entries are tested top to bottom; the first entry
/// with any matching pattern wins.
#[derive(Debug, Clone)]
pub struct ClassifierTable {
    entries: Vec<ClassifierEntry>,
}

impl ClassifierTable {
    /// Build a table from `(module, pattern sources)` rows.
    pub fn new(rows: &[(ModuleName, &[&str])]) -> Result<Self> {
        let mut entries = Vec::with_capacity(rows.len());
        for (module, sources) in rows {
            let mut patterns = Vec::with_capacity(sources.len());
            for source in *sources {
                let re = Regex::new(source).map_err(|e| {
                    StyleError::Parse(format!("invalid pattern for module {}: {}", module, e))
                })?;
                patterns.push(re);
            }
            entries.push(ClassifierEntry {
                module: *module,
                patterns,
            });
        }
        Ok(Self { entries })
    }

    /// The built-in table, in classification order
    /// (reset, variables, base, layout, components, utilities, animations, responsive).
    pub fn builtin() -> Result<Self> {
        Self::new(BUILTIN_ROWS)
    }

    pub fn entries(&self) -> &[ClassifierEntry] {
        &self.entries
    }

    /// Module for a single rule.
    pub fn module_for(&self, rule: &Rule) -> ModuleName {
        let subject = rule.subject();
        self.entries
            .iter()
            .find(|entry| entry.patterns.iter().any(|p| p.is_match(&subject)))
            .map(|entry| entry.module)
            .unwrap_or(DEFAULT_MODULE)
    }
}

const BUILTIN_ROWS: &[(ModuleName, &[&str])] = &[
    (
        ModuleName::Reset,
        &[
            r"^\*",
            r"^(html|body)\s*,\s*(html|body|div|span|h[1-6]|p|ul|ol|a)\b",
        ],
    ),
    (
        ModuleName::Variables,
        &[r"^:root\b", r"^\[data-theme", r"^@property\b"],
    ),
    (
        ModuleName::Base,
        &[
            r"^(html|body|h[1-6]|p|a|img|ul|ol|li|strong|em|blockquote|button|input|select|textarea|label|table|hr|figure)\b([:\[\s,>+~{]|$)",
            r"^::selection",
            r"^@font-face\b",
        ],
    ),
    (
        ModuleName::Layout,
        &[
            r"^\.(container|wrapper|row|col|grid|flex|section|header|footer|main|sidebar|layout)([-_][\w-]*)?\b",
            r"^(header|footer|main|section|nav|aside)\b([:\[\s,>+~{]|$)",
        ],
    ),
    (
        ModuleName::Components,
        &[
            r"^\.(btn|button|card|nav|navbar|menu|hero|modal|form|feature|contact|badge|alert|tab|dropdown|tooltip|testimonial|pricing|logo)([-_][\w-]*)?\b",
        ],
    ),
    (
        ModuleName::Utilities,
        &[
            r"^\.(text|bg|font|fw|m[trblxy]?|p[trblxy]?|w|h|d|gap|mt|mb|ml|mr|pt|pb|pl|pr)-[\w-]+\b",
            r"^\.(hidden|visible|sr-only|clearfix|truncate|flex-center|no-scroll)\b",
        ],
    ),
    (
        ModuleName::Animations,
        &[
            r"^@(-webkit-|-moz-|-o-)?keyframes\b",
            r"^\.(animate|fade|slide|bounce|spin|pulse|zoom)([-_][\w-]*)?\b",
        ],
    ),
    (ModuleName::Responsive, &[r"^@media\b"]),
];

/// Classified rules keyed by module.
///
/// Iteration follows [`ModuleName::IMPORT_ORDER`]; rules keep source order
/// within their module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSet {
    modules: BTreeMap<ModuleName, Vec<Rule>>,
}

impl ModuleSet {
    pub fn rules(&self, module: ModuleName) -> &[Rule] {
        self.modules.get(&module).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Non-empty modules in import order.
    pub fn iter(&self) -> impl Iterator<Item = (ModuleName, &[Rule])> {
        self.modules
            .iter()
            .filter(|(_, rules)| !rules.is_empty())
            .map(|(module, rules)| (*module, rules.as_slice()))
    }

    /// Total rules across all modules.
    pub fn total_rules(&self) -> usize {
        self.modules.values().map(Vec::len).sum()
    }

    /// Rule count per non-empty module.
    pub fn counts(&self) -> BTreeMap<ModuleName, usize> {
        self.iter().map(|(m, rules)| (m, rules.len())).collect()
    }
}

/// Classify every rule. Total: each rule lands in exactly one module.
pub fn classify(table: &ClassifierTable, rules: Vec<Rule>) -> ModuleSet {
    let mut modules: BTreeMap<ModuleName, Vec<Rule>> = BTreeMap::new();
    for rule in rules {
        let module = table.module_for(&rule);
        modules.entry(module).or_default().push(rule);
    }
    ModuleSet { modules }
}
