//! Persists classified modules as partial files plus one aggregator.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classify::{ModuleName, ModuleSet};
use crate::error::{Result, StyleError};

/// File name of the aggregator that imports every written module.
pub const AGGREGATOR_FILE: &str = "style.css";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrittenFile {
    /// `None` for the aggregator.
    pub module: Option<ModuleName>,
    pub path: PathBuf,
    pub rules: usize,
    pub bytes: u64,
}

/// Text of one module partial: header comment, then rules separated by blank lines.
pub fn render_module(module: ModuleName, rules: &[crate::tokenizer::Rule]) -> String {
    let mut out = format!(
        "/* ==========================================\n   {} ({} rules)\n   ========================================== */\n\n",
        module.name().to_uppercase(),
        rules.len()
    );
    let body: Vec<&str> = rules.iter().map(|r| r.text.as_str()).collect();
    out.push_str(&body.join("\n\n"));
    out.push('\n');
    out
}

/// Aggregator text importing `modules` in the given order.
pub fn render_aggregator(modules: &[ModuleName]) -> String {
    let mut out = String::from("/* Generated module index. Import order is significant. */\n\n");
    for module in modules {
        out.push_str(&format!("@import url('{}');\n", module.file_name()));
    }
    out
}

/// Write each non-empty module to `out_dir/_<module>.css` in import order,
/// then `out_dir/style.css` importing exactly the files written.
pub fn write_modules(modules: &ModuleSet, out_dir: &Path) -> Result<Vec<WrittenFile>> {
    std::fs::create_dir_all(out_dir).map_err(|e| StyleError::io(out_dir, e))?;

    let mut written = Vec::new();
    for module in ModuleName::IMPORT_ORDER {
        let rules = modules.rules(module);
        if rules.is_empty() {
            continue;
        }
        let path = out_dir.join(module.file_name());
        let content = render_module(module, rules);
        std::fs::write(&path, &content).map_err(|e| StyleError::io(&path, e))?;
        debug!(module = %module, rules = rules.len(), path = %path.display(), "module written");
        written.push(WrittenFile {
            module: Some(module),
            path,
            rules: rules.len(),
            bytes: content.len() as u64,
        });
    }

    let imported: Vec<ModuleName> = written.iter().filter_map(|f| f.module).collect();
    let path = out_dir.join(AGGREGATOR_FILE);
    let content = render_aggregator(&imported);
    std::fs::write(&path, &content).map_err(|e| StyleError::io(&path, e))?;
    written.push(WrittenFile {
        module: None,
        path,
        rules: 0,
        bytes: content.len() as u64,
    });

    info!(
        modules = imported.len(),
        rules = modules.total_rules(),
        dir = %out_dir.display(),
        "modules written"
    );
    Ok(written)
}
