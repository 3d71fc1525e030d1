use crate::CatGateError;

/// 资源单位后缀，两字符后缀需排在前面
const SUFFIXES: [(&str, f64); 11] = [
  ("Ki", 1024.0),
  ("Mi", 1024.0 * 1024.0),
  ("Gi", 1024.0 * 1024.0 * 1024.0),
  ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
  ("n", 1e-9),
  ("u", 1e-6),
  ("m", 1e-3),
  ("k", 1e3),
  ("M", 1e6),
  ("G", 1e9),
  ("T", 1e12),
];

/// Convert a cluster resource quantity into an absolute number
/// (CPU in cores, memory in bytes).
///
/// `"500m"` is half a core, `"2Gi"` is `2 * 2^30` bytes, an empty string is zero.
pub fn parse_quantity(text: &str) -> Result<f64, CatGateError> {
  let text = text.trim();
  if text.is_empty() {
    return Ok(0.0);
  }

  let (number, scale) = SUFFIXES
    .iter()
    .find_map(|(suffix, scale)| text.strip_suffix(suffix).map(|number| (number, *scale)))
    .unwrap_or((text, 1.0));

  number
    .parse::<f64>()
    .map(|value| value * scale)
    .map_err(|_| CatGateError::infrastructure(format!("Invalid resource quantity {:?}", text)))
}
