use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Read a JSON or YAML file and deserialise into a typed struct.
///
/// `.yaml`/`.yml` files go through serde_yaml; anything else is JSON.
pub fn read_input<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let contents = fs::read_to_string(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;

    let value: T = if is_yaml(&canonical) {
        serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?
    } else {
        serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?
    };
    Ok(value)
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Resolve the path against the working directory and check it is a file.
fn resolve_path(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let p = Path::new(path);
    let canonical = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };

    if !canonical.exists() {
        return Err(format!("File not found: {}", canonical.display()).into());
    }

    if !canonical.is_file() {
        return Err(format!("Not a file: {}", canonical.display()).into());
    }

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uscan_core::monte_carlo::NoteValuationInput;

    #[test]
    fn test_yaml_extension_detected() {
        assert!(is_yaml(Path::new("deal.yaml")));
        assert!(is_yaml(Path::new("deal.yml")));
        assert!(!is_yaml(Path::new("deal.json")));
    }

    #[test]
    fn test_reads_yaml_note() {
        let path = std::env::temp_dir().join(format!("uscan-note-{}.yaml", std::process::id()));
        fs::write(
            &path,
            "structure:\n  name: Tencent_Baba_KO98\n  underlyings: [Tencent, Baba]\n  \
             barriers:\n    - type: KO_DOWN\n      level: 98%\n  maturity: 0.3333\n  \
             coupon_rate: 11\nassumptions:\n  n_paths: 500\n",
        )
        .unwrap();
        let note: NoteValuationInput = read_input(path.to_str().unwrap()).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(note.structure.underlyings.len(), 2);
        assert_eq!(note.assumptions.n_paths, 500);
        assert_eq!(note.seed, Some(42));
    }

    #[test]
    fn test_missing_file() {
        assert!(read_input::<NoteValuationInput>("/no/such/deal.json").is_err());
    }
}
