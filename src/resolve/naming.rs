//! Identifier normalization to lower snake case.

use std::collections::{HashMap, HashSet};

use crate::graph::PropertyKind;
use crate::transform::Context;

/// Lower snake case with camel-case boundaries split and any run of other
/// characters collapsed to a single `_`. A leading digit gets a `_` prefix.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, c) in chars.iter().copied().enumerate() {
        if c.is_alphanumeric() {
            if c.is_uppercase() && i > 0 {
                let prev = chars[i - 1];
                let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                if prev.is_lowercase() || prev.is_numeric() || (prev.is_uppercase() && next_lower) {
                    out.push('_');
                }
            }
            // Lowering may add combining marks, as for `İ`.
            out.extend(c.to_lowercase().filter(|l| l.is_alphanumeric()));
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }

    let trimmed = out.trim_matches('_');
    let mut collapsed = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        if c == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(c);
    }

    match collapsed.chars().next() {
        None => "_".to_string(),
        Some(first) if first.is_ascii_digit() => format!("_{}", collapsed),
        Some(_) => collapsed,
    }
}

/// Snake-case every name in `names`, keeping them unique in order of
/// appearance with `_2`, `_3`... suffixes.
fn unique_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    let mut result = Vec::new();
    for name in names {
        let base = snake_case(name);
        let mut candidate = base.clone();
        let mut n = 2;
        while used.contains(&candidate) {
            candidate = format!("{}_{}", base, n);
            n += 1;
        }
        used.insert(candidate.clone());
        result.push(candidate);
    }
    result
}

/// Rename nodes, properties and enumeration literals in place. Running it a
/// second time changes nothing.
pub fn normalize(ctx: &mut Context) {
    let ids = ctx.graph.node_ids();
    let names = unique_names(ids.iter().filter_map(|id| ctx.graph.node(*id)).map(|n| n.name.as_str()));
    for (id, name) in ids.iter().zip(names) {
        if let Some(node) = ctx.graph.node_mut(*id) {
            node.name = name;
        }
    }

    for id in ids {
        let Some(node) = ctx.graph.node_mut(id) else {
            continue;
        };
        let names = unique_names(node.properties.iter().map(|p| p.name.as_str()));
        let mut literal_renames = Vec::new();
        for (property, name) in node.properties.iter_mut().zip(names) {
            property.name = name;
            if let PropertyKind::Enumeration(domain) = &mut property.kind {
                domain.name = snake_case(&domain.name);
                let renamed = unique_names(domain.literals.iter().map(String::as_str));
                let renames: HashMap<String, String> =
                    domain.literals.iter().cloned().zip(renamed.iter().cloned()).collect();
                domain.literals = renamed;
                literal_renames.push((property.id, renames));
            }
        }

        if !node.lookup_values.is_empty() {
            let renamed = unique_names(node.lookup_values.iter().map(String::as_str));
            let renames: HashMap<String, String> =
                node.lookup_values.iter().cloned().zip(renamed.iter().cloned()).collect();
            node.lookup_values = renamed;
            if let Some(value) = node.properties.iter().find(|p| !p.primary_key) {
                literal_renames.push((value.id, renames));
            }
        }

        for (property, renames) in literal_renames {
            ctx.tracker.rename_filter_literals(id, property, &renames);
        }
    }
    log::debug!("normalized identifiers of {} nodes", ctx.graph.node_count());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{MappingStrategy, Options};
    use crate::tracker::FilterValue;
    use crate::transform::transform_source;

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("ForProfit"), "for_profit");
        assert_eq!(snake_case("HTTPServer"), "http_server");
        assert_eq!(snake_case("birth date"), "birth_date");
        assert_eq!(snake_case("Person_nickname"), "person_nickname");
        assert_eq!(snake_case("3rd-Party"), "_3rd_party");
        assert_eq!(snake_case("a--b"), "a_b");
        assert_eq!(snake_case("valueV2"), "value_v2");
    }

    #[test]
    fn test_snake_case_idempotent() {
        for name in ["ForProfit", "HTTPServer", "3rd-Party", "x__y", "_hidden", "名前Test", "İstanbul"] {
            let once = snake_case(name);
            assert_eq!(snake_case(&once), once, "{name}");
        }
        assert_eq!(snake_case("İstanbul"), "istanbul");
    }

    #[test]
    fn test_unique_names() {
        let names = unique_names(["a_2", "A", "a"]);
        assert_eq!(names, vec!["a_2", "a", "a_3"]);
        assert_eq!(unique_names(names.iter().map(String::as_str)), names);
    }

    #[test]
    fn test_normalize_renames_filter_literals() {
        let options = Options {
            mapping_strategy: MappingStrategy::KindPerTable,
            standardize_names: true,
            ..Options::default()
        };
        let result = transform_source(
            r#"
            kind Organization
            subkind ForProfit
            subkind NonProfit
            genset Organization disjoint complete { ForProfit, NonProfit }
            "#,
            &options,
        )
        .unwrap();
        let organization = result.graph.node_by_name("organization").unwrap();
        let column = organization.property_by_name("organization_type").unwrap();
        assert_eq!(
            column.enumeration().unwrap().literals,
            vec!["for_profit", "non_profit"]
        );
        let tracer = result.tracker.class_tracer("ForProfit").unwrap();
        assert_eq!(
            tracer.targets[&organization.id].filters[0].value,
            FilterValue::Literal("for_profit".into())
        );
    }

    #[test]
    fn test_normalize_twice_is_noop() {
        let options = Options {
            standardize_names: true,
            ..Options::default()
        };
        let result = transform_source(
            "enum EyeColor { LightBlue, darkBrown }\nkind BankAccount { OwnerName string, eyeColor EyeColor, tags string * }",
            &options,
        )
        .unwrap();
        let account = result.graph.node_by_name("bank_account").unwrap();
        assert!(account.property_by_name("owner_name").is_some());
        let eye = account.property_by_name("eye_color").unwrap();
        assert_eq!(eye.enumeration().unwrap().literals, vec!["light_blue", "dark_brown"]);
        assert!(result.graph.node_by_name("bank_account_tags").is_some());

        let mut ctx = crate::transform::Context::new(result.graph.clone(), result.tracker.clone(), &options);
        normalize(&mut ctx);
        for (again, once) in ctx.graph.nodes().zip(result.graph.nodes()) {
            assert_eq!(again.name, once.name);
            assert_eq!(again.properties, once.properties);
        }
    }
}
