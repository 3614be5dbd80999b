use std::collections::HashMap;

/// A manifest value: either a scalar or a list of scalars.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Fields such as `authors` may be written either way; callers always
    /// want a list.
    pub fn into_list(self) -> Vec<String> {
        match self {
            FieldValue::Scalar(s) => vec![s],
            FieldValue::List(items) => items,
        }
    }

    pub fn into_scalar(self) -> Option<String> {
        match self {
            FieldValue::Scalar(s) => Some(s),
            FieldValue::List(items) => items.into_iter().next(),
        }
    }
}

/// Lower-cased top-level keys of a manifest.
pub type ManifestFields = HashMap<String, FieldValue>;

fn unquote(value: &str) -> &str {
    value.trim().trim_matches(|c| c == '\'' || c == '"')
}

/// Minimal reader for `plugin.yml`-style text.
///
/// Understands `key: value` lines and a bare `key:` followed by `- item`
/// lines. Comments, blank lines and anything else are skipped. Indentation
/// is not tracked, so nested keys land at the top level.
pub fn parse_flat_yaml(content: &str) -> ManifestFields {
    let mut fields = ManifestFields::new();
    let mut current_key: Option<String> = None;
    let mut current_list: Vec<String> = Vec::new();

    for line in content.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        if let Some(item) = stripped.strip_prefix("- ") {
            if current_key.is_some() {
                current_list.push(unquote(item).to_string());
            }
            continue;
        }

        if !current_list.is_empty() {
            if let Some(key) = current_key.take() {
                fields.insert(key, FieldValue::List(std::mem::take(&mut current_list)));
            }
        }

        let Some((key, value)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = unquote(value);

        if value.is_empty() {
            current_key = Some(key);
            current_list.clear();
        } else {
            fields.insert(key, FieldValue::Scalar(value.to_string()));
            current_key = None;
        }
    }

    if let Some(key) = current_key {
        if !current_list.is_empty() {
            fields.insert(key, FieldValue::List(current_list));
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_scalars_and_lists() {
        let fields = parse_flat_yaml(
            r#"
# comment
name: 'WorldGuard'
Version: "7.0.9"
main: com.sk89q.worldguard.bukkit.WorldGuardPlugin
depend:
  - WorldEdit
  - "Vault"
softdepend: [ignored-flow-style]
"#,
        );
        assert_eq!(fields["name"], FieldValue::Scalar("WorldGuard".into()));
        assert_eq!(fields["version"], FieldValue::Scalar("7.0.9".into()));
        assert_eq!(
            fields["depend"],
            FieldValue::List(vec!["WorldEdit".into(), "Vault".into()])
        );
        assert_eq!(
            fields["softdepend"],
            FieldValue::Scalar("[ignored-flow-style]".into())
        );
    }

    #[test]
    fn empty_key_without_items_is_dropped() {
        let fields = parse_flat_yaml("authors:\nname: Essentials\nloadbefore:\n");
        assert!(!fields.contains_key("authors"));
        assert!(!fields.contains_key("loadbefore"));
        assert_eq!(fields["name"], FieldValue::Scalar("Essentials".into()));
    }

    #[test]
    fn unparsable_lines_are_ignored() {
        let fields = parse_flat_yaml("no colon here\n- orphan item\nname: X");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["name"], FieldValue::Scalar("X".into()));
    }

    #[test]
    fn single_value_normalizes_to_list() {
        assert_eq!(
            FieldValue::Scalar("md_5".into()).into_list(),
            vec!["md_5".to_string()]
        );
    }
}
