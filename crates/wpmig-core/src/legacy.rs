//! Decoders for blobs the legacy site stored in custom fields.
//!
//! Membership lists were persisted with PHP's `serialize()`. Newer exports
//! may carry them already decoded as a JSON object. Both forms decode to the
//! same ordered `(id, label)` list.

/// A value in PHP's `serialize()` format.
#[derive(Debug, Clone, PartialEq)]
pub enum PhpValue {
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  Str(String),
  Array(Vec<(PhpValue, PhpValue)>),
}

impl PhpValue {
  /// Scalar rendering used for ids and labels.
  fn scalar(&self) -> Option<String> {
    match self {
      Self::Int(i) => Some(i.to_string()),
      Self::Str(s) => Some(s.clone()),
      Self::Float(f) => Some(f.to_string()),
      Self::Bool(b) => Some((if *b { "1" } else { "" }).to_owned()),
      Self::Null => Some(String::new()),
      Self::Array(_) => None,
    }
  }
}

/// Decode an `id => label` map from either serialized or JSON form.
///
/// Serialized entries keep their stored order; JSON objects come back in key
/// order. Errors carry a human-readable reason.
pub fn decode_id_map(raw: &str) -> Result<Vec<(String, String)>, String> {
  let raw = raw.trim();

  if raw.starts_with('{') {
    let map: serde_json::Map<String, serde_json::Value> =
      serde_json::from_str(raw).map_err(|e| e.to_string())?;
    return Ok(
      map
        .into_iter()
        .map(|(id, v)| {
          let label = match v {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
          };
          (id, label)
        })
        .collect(),
    );
  }

  match unserialize(raw)? {
    PhpValue::Array(entries) => entries
      .into_iter()
      .map(|(k, v)| {
        let id = k.scalar().ok_or("array used as a key")?;
        let label = v.scalar().unwrap_or_default();
        Ok((id, label))
      })
      .collect(),
    other => Err(format!("expected an array, found {other:?}")),
  }
}

/// Parse one complete serialized value; trailing input is an error.
pub fn unserialize(input: &str) -> Result<PhpValue, String> {
  let mut p = Parser { bytes: input.as_bytes(), pos: 0, depth: 0 };
  let value = p.value()?;
  if p.pos != p.bytes.len() {
    return Err(format!("trailing data at byte {}", p.pos));
  }
  Ok(value)
}

/// Deepest array nesting accepted; membership lists are one level deep.
const MAX_DEPTH: usize = 32;

struct Parser<'a> {
  bytes: &'a [u8],
  pos:   usize,
  depth: usize,
}

impl Parser<'_> {
  fn value(&mut self) -> Result<PhpValue, String> {
    let tag = self.next()?;
    match tag {
      b'N' => {
        self.expect(b';')?;
        Ok(PhpValue::Null)
      }
      b'b' => {
        self.expect(b':')?;
        let v = self.until(b';')?;
        Ok(PhpValue::Bool(v == "1"))
      }
      b'i' => {
        self.expect(b':')?;
        let v = self.until(b';')?;
        v.parse()
          .map(PhpValue::Int)
          .map_err(|_| format!("bad integer {v:?}"))
      }
      b'd' => {
        self.expect(b':')?;
        let v = self.until(b';')?;
        v.parse()
          .map(PhpValue::Float)
          .map_err(|_| format!("bad float {v:?}"))
      }
      b's' => {
        self.expect(b':')?;
        let len = self.length()?;
        self.expect(b'"')?;
        let end = self
          .pos
          .checked_add(len)
          .filter(|&end| end <= self.bytes.len())
          .ok_or("string length runs past end of input")?;
        let slice = &self.bytes[self.pos..end];
        let s = String::from_utf8_lossy(slice).into_owned();
        self.pos = end;
        self.expect(b'"')?;
        self.expect(b';')?;
        Ok(PhpValue::Str(s))
      }
      b'a' => {
        self.expect(b':')?;
        let count = self.length()?;
        self.expect(b'{')?;
        if self.depth == MAX_DEPTH {
          return Err(format!("arrays nested deeper than {MAX_DEPTH}"));
        }
        self.depth += 1;
        // Every entry takes at least four bytes, so the remaining input bounds
        // how many can really follow.
        let mut entries = Vec::with_capacity(count.min(self.remaining() / 4));
        for _ in 0..count {
          let k = self.value()?;
          let v = self.value()?;
          entries.push((k, v));
        }
        self.depth -= 1;
        self.expect(b'}')?;
        Ok(PhpValue::Array(entries))
      }
      other => Err(format!("unsupported type tag {:?}", other as char)),
    }
  }

  /// `<digits>:` as used by string and array headers.
  fn length(&mut self) -> Result<usize, String> {
    let v = self.until(b':')?;
    v.parse().map_err(|_| format!("bad length {v:?}"))
  }

  fn until(&mut self, stop: u8) -> Result<String, String> {
    let rest = &self.bytes[self.pos..];
    let n = rest
      .iter()
      .position(|&b| b == stop)
      .ok_or_else(|| format!("expected {:?}", stop as char))?;
    let s = String::from_utf8_lossy(&rest[..n]).into_owned();
    self.pos += n + 1;
    Ok(s)
  }

  fn remaining(&self) -> usize { self.bytes.len() - self.pos }

  fn next(&mut self) -> Result<u8, String> {
    let b = *self.bytes.get(self.pos).ok_or("unexpected end of input")?;
    self.pos += 1;
    Ok(b)
  }

  fn expect(&mut self, want: u8) -> Result<(), String> {
    let got = self.next()?;
    if got == want {
      Ok(())
    } else {
      Err(format!(
        "expected {:?} at byte {}, found {:?}",
        want as char,
        self.pos - 1,
        got as char
      ))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scalars() {
    assert_eq!(unserialize("N;"), Ok(PhpValue::Null));
    assert_eq!(unserialize("b:1;"), Ok(PhpValue::Bool(true)));
    assert_eq!(unserialize("i:-7;"), Ok(PhpValue::Int(-7)));
    assert_eq!(unserialize(r#"s:3:"a;b";"#), Ok(PhpValue::Str("a;b".into())));
  }

  #[test]
  fn string_length_counts_bytes() {
    assert_eq!(
      unserialize(r#"s:6:"Señor";"#),
      Ok(PhpValue::Str("Señor".into()))
    );
  }

  #[test]
  fn id_map_from_serialized_array() {
    let got = decode_id_map(r#"a:2:{i:12;s:5:"Chair";s:2:"40";s:0:"";}"#);
    assert_eq!(
      got,
      Ok(vec![
        ("12".to_string(), "Chair".to_string()),
        ("40".to_string(), String::new()),
      ])
    );
  }

  #[test]
  fn id_map_from_json_object() {
    let got = decode_id_map(r#"{"12": "Chair", "40": null}"#).unwrap();
    assert_eq!(got[0], ("12".to_string(), "Chair".to_string()));
    assert_eq!(got[1], ("40".to_string(), String::new()));
  }

  #[test]
  fn truncated_input_is_an_error() {
    assert!(decode_id_map(r#"a:2:{i:12;s:5:"Chair";"#).is_err());
    assert!(decode_id_map("just a string").is_err());
    assert!(unserialize("i:1;extra").is_err());
  }

  #[test]
  fn oversized_lengths_are_errors() {
    let got = decode_id_map(r#"a:1:{i:1;s:18446744073709551615:"x";}"#);
    assert_eq!(got, Err("string length runs past end of input".to_owned()));
    assert!(decode_id_map("a:4611686018427387904:{}").is_err());
    assert!(decode_id_map("a:18446744073709551615:{i:1;i:2;}").is_err());
  }

  #[test]
  fn deep_nesting_is_an_error() {
    let depth = MAX_DEPTH + 1;
    let raw = format!("{}i:1;{}", "a:1:{i:0;".repeat(depth), "}".repeat(depth));
    assert_eq!(unserialize(&raw), Err(format!("arrays nested deeper than {MAX_DEPTH}")));

    let ok = format!("{}i:1;{}", "a:1:{i:0;".repeat(MAX_DEPTH), "}".repeat(MAX_DEPTH));
    assert!(unserialize(&ok).is_ok());
  }
}
