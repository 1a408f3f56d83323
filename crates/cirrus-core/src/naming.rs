// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource name filtering and bulk-creation name templates.

/// Placeholder replaced with the 1-based index during bulk creation.
pub const NAME_COUNTER_PLACEHOLDER: &str = "%d";

/// Strip characters outside `[A-Za-z0-9 ._-]` and trim surrounding whitespace.
pub fn filter_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Derive the name of the `index`-th (1-based) instance of a bulk creation.
///
/// The first `%d` in the template is replaced with the index; a template
/// without a placeholder is used verbatim for every instance.
pub fn format_instance_name(template: &str, index: usize) -> String {
    if template.contains(NAME_COUNTER_PLACEHOLDER) {
        template.replacen(NAME_COUNTER_PLACEHOLDER, &index.to_string(), 1)
    } else {
        template.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_name() {
        assert_eq!(filter_name("  web-01.prod_a  "), "web-01.prod_a");
        assert_eq!(filter_name("db<script>"), "dbscript");
        assert_eq!(filter_name("%$#"), "");
    }

    #[test]
    fn test_template_substitutes_index() {
        let names: Vec<String> = (1..=3).map(|i| format_instance_name("web-%d", i)).collect();
        assert_eq!(names, vec!["web-1", "web-2", "web-3"]);
    }

    #[test]
    fn test_template_replaces_first_placeholder_only() {
        assert_eq!(format_instance_name("n%d-%d", 7), "n7-%d");
    }

    #[test]
    fn test_literal_name_is_shared() {
        assert_eq!(format_instance_name("worker", 2), "worker");
        assert_eq!(format_instance_name("100%", 2), "100%");
    }
}
