//! Plain-text `.scale` file written next to every INT8 tensor file.
//!
//! Holds the same value as the inline header scale, formatted with ten
//! decimal digits and a trailing newline.

use std::path::{Path, PathBuf};

use crate::errors::{PackError, Result};

pub const SCALE_EXTENSION: &str = "scale";

/// `layer_0_attn_q.weights` -> `layer_0_attn_q.scale`
pub fn sidecar_path(tensor_path: &Path) -> PathBuf {
    tensor_path.with_extension(SCALE_EXTENSION)
}

pub fn format_scale(scale: f32) -> String {
    format!("{:.10}\n", scale as f64)
}

/// Write the sidecar for `tensor_path` and return where it went.
pub fn write_scale_sidecar(tensor_path: &Path, scale: f32) -> Result<PathBuf> {
    let path = sidecar_path(tensor_path);
    std::fs::write(&path, format_scale(scale)).map_err(|e| PackError::write_failure(&path, e))?;
    Ok(path)
}

/// Read the sidecar belonging to `tensor_path`.
pub fn read_scale_sidecar(tensor_path: &Path) -> Result<f32> {
    let path = sidecar_path(tensor_path);
    let text = std::fs::read_to_string(&path).map_err(|e| PackError::read_failure(&path, e))?;
    text.trim()
        .parse::<f32>()
        .map_err(|e| PackError::malformed(&path, format!("bad scale value '{}': {e}", text.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_path_replaces_extension() {
        assert_eq!(
            sidecar_path(Path::new("out/layer_3_ffn_up.weights")),
            PathBuf::from("out/layer_3_ffn_up.scale")
        );
        assert_eq!(sidecar_path(Path::new("noext")), PathBuf::from("noext.scale"));
    }

    #[test]
    fn test_format_has_ten_digits() {
        assert_eq!(format_scale(1.0), "1.0000000000\n");
        assert_eq!(format_scale(0.5), "0.5000000000\n");
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let tensor = dir.path().join("w.weights");
        let written = write_scale_sidecar(&tensor, 0.25).unwrap();
        assert_eq!(written, dir.path().join("w.scale"));
        assert_eq!(read_scale_sidecar(&tensor).unwrap(), 0.25);
    }

    #[test]
    fn test_unparsable_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let tensor = dir.path().join("w.weights");
        std::fs::write(sidecar_path(&tensor), "not-a-number\n").unwrap();
        assert!(matches!(read_scale_sidecar(&tensor), Err(PackError::MalformedFile { .. })));
    }
}
