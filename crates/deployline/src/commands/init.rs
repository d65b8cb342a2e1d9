use std::path::Path;

use anyhow::bail;
use deployline_core::DeploylineConfig;

pub fn init(path: &Path, name: &str) -> anyhow::Result<()> {
    let output = path.join("deployline.toml");
    if output.exists() {
        bail!("{} already exists", output.display());
    }

    let config = DeploylineConfig::scaffold(name);
    std::fs::create_dir_all(path)?;
    std::fs::write(&output, config.to_toml_string()?)?;
    println!("✓ Generated {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_loadable_scaffold_once() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), "blog").unwrap();

        let config = DeploylineConfig::from_file(&dir.path().join("deployline.toml")).unwrap();
        assert_eq!(config.unit().name, "blog");
        assert!(config.plan().is_ok());

        assert!(init(dir.path(), "blog").is_err());
    }
}
