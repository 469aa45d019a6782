//! Best-effort reformatting of textual package assets.
//!
//! Only JSON and markup are touched. Anything that does not look like text,
//! or that fails to parse, is handed back unchanged.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::Value;

/// Bytes inspected by [`is_text`]
const SNIFF_LEN: usize = 512;

const INDENT: &str = "  ";

/// Column limit for keeping a flat array on one line
const WIDTH: usize = 80;

/// Reformat `content` according to the extension of `name`.
pub fn beautify<'a>(content: &'a [u8], name: &str) -> Cow<'a, [u8]> {
    if !is_text(content) {
        return Cow::Borrowed(content);
    }

    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());

    match ext.as_deref() {
        Some("json") => beautify_json(content),
        Some("wxml") | Some("html") => beautify_markup(content),
        _ => Cow::Borrowed(content),
    }
}

/// True if the first 512 bytes hold no control characters other than
/// tab, LF and CR.
pub fn is_text(data: &[u8]) -> bool {
    data.iter()
        .take(SNIFF_LEN)
        .all(|&b| b >= 0x20 || matches!(b, b'\t' | b'\n' | b'\r'))
}

/// Pretty-print JSON with two-space indentation, keeping key order.
///
/// Malformed input is returned as is, and so is any document with a
/// repeated object key, since [`Value`] would keep only the last member.
pub fn beautify_json(content: &[u8]) -> Cow<'_, [u8]> {
    let Ok(value) = serde_json::from_slice::<Value>(content) else {
        return Cow::Borrowed(content);
    };
    if serde_json::from_slice::<UniqueKeys>(content).is_err() {
        return Cow::Borrowed(content);
    }

    let mut out = String::with_capacity(content.len() * 2);
    write_json(&mut out, &value, 0);
    out.push('\n');
    Cow::Owned(out.into_bytes())
}

fn write_json(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Array(items) if items.is_empty() => out.push_str("[]"),
        Value::Object(map) if map.is_empty() => out.push_str("{}"),
        Value::Array(items) => {
            if let Some(line) = flat_array(items, current_column(out)) {
                out.push_str(&line);
                return;
            }
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                newline(out, depth + 1);
                write_json(out, item, depth + 1);
            }
            newline(out, depth);
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                newline(out, depth + 1);
                out.push_str(&Value::from(key.as_str()).to_string());
                out.push_str(": ");
                write_json(out, item, depth + 1);
            }
            newline(out, depth);
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Render an array of scalars on one line if it fits before [`WIDTH`].
fn flat_array(items: &[Value], column: usize) -> Option<String> {
    if items.iter().any(|v| v.is_array() || v.is_object()) {
        return None;
    }
    let parts: Vec<String> = items.iter().map(Value::to_string).collect();
    let line = format!("[{}]", parts.join(", "));
    // room for a trailing comma
    (column + line.chars().count() < WIDTH).then_some(line)
}

fn current_column(out: &str) -> usize {
    match out.rfind('\n') {
        Some(pos) => out[pos + 1..].chars().count(),
        None => out.chars().count(),
    }
}

fn newline(out: &mut String, depth: usize) {
    out.push('\n');
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

/// Put every tag on its own line.
///
/// This is a plain byte transform: a `<` or `>` inside an attribute value or
/// inline script also starts a new line. Only ASCII whitespace is trimmed,
/// so text in any ASCII-compatible encoding (GBK included) is kept intact.
pub fn beautify_markup(content: &[u8]) -> Cow<'_, [u8]> {
    let mut spaced = Vec::with_capacity(content.len() + content.len() / 8);
    for &b in content {
        match b {
            b'<' => spaced.extend_from_slice(b"\n<"),
            b'>' => spaced.extend_from_slice(b">\n"),
            _ => spaced.push(b),
        }
    }

    let lines: Vec<&[u8]> = spaced
        .split(|&b| b == b'\n')
        .map(<[u8]>::trim_ascii)
        .filter(|line| !line.is_empty())
        .collect();

    Cow::Owned(lines.join(&b'\n'))
}

/// Accepts any JSON document whose objects never repeat a key.
struct UniqueKeys;

impl<'de> Deserialize<'de> for UniqueKeys {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(UniqueKeysVisitor)
    }
}

struct UniqueKeysVisitor;

impl<'de> Visitor<'de> for UniqueKeysVisitor {
    type Value = UniqueKeys;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<UniqueKeys, E> {
        Ok(UniqueKeys)
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<UniqueKeys, E> {
        Ok(UniqueKeys)
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<UniqueKeys, E> {
        Ok(UniqueKeys)
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<UniqueKeys, E> {
        Ok(UniqueKeys)
    }

    fn visit_str<E: de::Error>(self, _: &str) -> Result<UniqueKeys, E> {
        Ok(UniqueKeys)
    }

    fn visit_unit<E: de::Error>(self) -> Result<UniqueKeys, E> {
        Ok(UniqueKeys)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<UniqueKeys, A::Error> {
        while seq.next_element::<UniqueKeys>()?.is_some() {}
        Ok(UniqueKeys)
    }

    // arbitrary_precision numbers also arrive here, as a one-key map
    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<UniqueKeys, A::Error> {
        let mut seen = HashSet::new();
        while let Some(key) = map.next_key::<String>()? {
            if seen.contains(&key) {
                return Err(de::Error::custom(format_args!("duplicate key `{key}`")));
            }
            map.next_value::<UniqueKeys>()?;
            seen.insert(key);
        }
        Ok(UniqueKeys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(bytes: Cow<'_, [u8]>) -> String {
        String::from_utf8(bytes.into_owned()).unwrap()
    }

    #[test]
    fn json_keeps_key_order() {
        let out = text(beautify(br#"{"b":1,"a":2}"#, "/app.json"));
        assert_eq!(out, "{\n  \"b\": 1,\n  \"a\": 2\n}\n");
    }

    #[test]
    fn json_nested_and_flat_arrays() {
        let out = text(beautify_json(
            br#"{"pages":["a","b"],"window":{"list":[{"x":1}],"empty":{}}}"#,
        ));
        let expected = r#"{
  "pages": ["a", "b"],
  "window": {
    "list": [
      {
        "x": 1
      }
    ],
    "empty": {}
  }
}
"#;
        assert_eq!(out, expected);
    }

    #[test]
    fn long_arrays_are_broken_up() {
        let items: Vec<String> = (0..30).map(|i| format!("\"item{i}\"")).collect();
        let input = format!("[{}]", items.join(","));
        let out = text(beautify_json(input.as_bytes()));
        assert!(out.starts_with("[\n  \"item0\",\n"));
        assert_eq!(out.lines().count(), 32);
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let out = text(beautify(br#"{"k":[]}"#, "/CONFIG.JSON"));
        assert_eq!(out, "{\n  \"k\": []\n}\n");
    }

    #[test]
    fn malformed_json_passes_through() {
        let input = br#"{"a": 1,"#;
        assert!(matches!(beautify(input, "x.json"), Cow::Borrowed(b) if b == input));
    }

    #[test]
    fn repeated_keys_pass_through() {
        let input = br#"{"a":1,"b":2,"a":3}"#;
        assert!(matches!(beautify(input, "/x.json"), Cow::Borrowed(b) if b == input));

        let nested = br#"{"window":{"t":"x","t":"y"},"n":1.50}"#;
        assert!(matches!(beautify_json(nested), Cow::Borrowed(b) if b == nested));
    }

    #[test]
    fn numbers_and_escaped_keys_are_not_duplicates() {
        let out = text(beautify_json(br#"{"a":1.50,"b":[1,2],"\u0063":3}"#));
        assert_eq!(out, "{\n  \"a\": 1.50,\n  \"b\": [1, 2],\n  \"c\": 3\n}\n");
    }

    #[test]
    fn markup_keeps_non_utf8_text() {
        let out = beautify(b"<view> \xD6\xD0\xCE\xC4 </view>", "/a.wxml");
        assert_eq!(&*out, b"<view>\n\xD6\xD0\xCE\xC4\n</view>");
    }

    #[test]
    fn markup_gets_one_tag_per_line() {
        let out = text(beautify(
            b"<view class=\"a\">  hello <text>hi</text></view>",
            "/pages/index.wxml",
        ));
        assert_eq!(
            out,
            "<view class=\"a\">\nhello\n<text>\nhi\n</text>\n</view>"
        );
    }

    #[test]
    fn scripts_and_binary_are_untouched() {
        let js = b"function a(){return 1}";
        assert_eq!(&*beautify(js, "/app.js"), js);

        let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
        png.extend_from_slice(b"{\"a\":1}");
        assert_eq!(&*beautify(&png, "/fake.json"), &png[..]);
    }

    #[test]
    fn text_sniffing_only_looks_at_the_prefix() {
        let mut data = vec![b'a'; 512];
        data.push(0x00);
        assert!(is_text(&data));
        data[10] = 0x01;
        assert!(!is_text(&data));
        assert!(is_text(b""));
        assert!(is_text(b"line\r\n\tindent"));
    }
}
