pub mod bm25;
pub mod eval;
pub mod fuse;

use anyhow::{Context, Result};
use std::path::Path;

/// Write `contents` to `output` (creating parent directories) or print it.
pub(crate) fn emit(output: Option<&Path>, contents: &str, label: &str) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(path, contents)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{label}: {}", path.display());
        }
        None => println!("{}", contents.trim_end()),
    }
    Ok(())
}
