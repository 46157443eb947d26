use std::path::Path;

use lord_model::Vars;
use time::OffsetDateTime;

use crate::{EnvError, EnvResult};

/// Read a dotenv file and return its variables with the file mtime.
pub async fn parse_env_file(path: &Path) -> EnvResult<(Vars, OffsetDateTime)> {
    let meta = tokio::fs::metadata(path).await?;
    let modified = OffsetDateTime::from(meta.modified()?);
    let content = tokio::fs::read_to_string(path).await?;

    let mut vars = Vars::new();
    for item in dotenvy::from_read_iter(content.as_bytes()) {
        let (k, v) = item.map_err(|e| EnvError::Parse {
            key: path.display().to_string(),
            reason: e.to_string(),
        })?;
        vars.set(k, v);
    }
    Ok((vars, modified))
}

/// Write `vars` as a dotenv file, one `KEY="value"` per line.
pub async fn write_env_file(path: &Path, vars: &Vars) -> EnvResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, render(vars)).await?;
    Ok(())
}

fn render(vars: &Vars) -> String {
    let mut out = String::new();
    for (k, v) in vars.iter() {
        out.push_str(k);
        out.push_str("=\"");
        for ch in v.chars() {
            match ch {
                '\\' | '"' | '$' => {
                    out.push('\\');
                    out.push(ch);
                }
                '\n' => out.push_str("\\n"),
                _ => out.push(ch),
            }
        }
        out.push_str("\"\n");
    }
    out
}
