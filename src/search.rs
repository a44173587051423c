//! Offline relevance ranking for reference data.

/// Text fields of an entity that offline search looks at.
#[derive(Debug, Clone, Default)]
pub struct SearchFields<'a> {
  pub name: Option<&'a str>,
  /// Individual tags, each matched on its own
  pub tags: Vec<&'a str>,
  pub code: &'a str,
  pub description: Option<&'a str>,
}

impl SearchFields<'_> {
  /// Best match per field, in tie-break priority order.
  fn matches(&self, query: &str) -> [Option<MatchKind>; 4] {
    let tags = self
      .tags
      .iter()
      .filter_map(|tag| match_kind(tag, query))
      .min();
    [
      self.name.and_then(|name| match_kind(name, query)),
      tags,
      match_kind(self.code, query),
      self.description.and_then(|d| match_kind(d, query)),
    ]
  }
}

/// How well a field matched the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchKind {
  Exact = 0,
  Prefix = 1,
  Contains = 2,
}

fn match_kind(field: &str, query: &str) -> Option<MatchKind> {
  let field = field.to_lowercase();
  if field == query {
    Some(MatchKind::Exact)
  } else if field.starts_with(query) {
    Some(MatchKind::Prefix)
  } else if field.contains(query) {
    Some(MatchKind::Contains)
  } else {
    None
  }
}

/// Score of the best matching field, lower is better. Match kind dominates,
/// field priority (name, tags, code, description) breaks ties.
pub fn score(fields: &SearchFields<'_>, query: &str) -> Option<u32> {
  let query = query.trim().to_lowercase();
  if query.is_empty() {
    return Some(0);
  }

  fields
    .matches(&query)
    .into_iter()
    .enumerate()
    .filter_map(|(priority, kind)| Some(kind? as u32 * 4 + priority as u32))
    .min()
}

/// Filter `items` to those matching `query`, best matches first.
///
/// The sort is stable, so equally ranked items keep their input order.
pub fn rank<T, F>(items: Vec<T>, query: &str, fields: F) -> Vec<T>
where
  F: Fn(&T) -> SearchFields<'_>,
{
  let mut matches: Vec<(T, u32)> = items
    .into_iter()
    .filter_map(|item| {
      let s = score(&fields(&item), query)?;
      Some((item, s))
    })
    .collect();

  matches.sort_by_key(|(_, s)| *s);

  matches.into_iter().map(|(item, _)| item).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Item {
    code: &'static str,
    name: Option<&'static str>,
    tags: Vec<&'static str>,
    description: Option<&'static str>,
  }

  fn item(code: &'static str, name: Option<&'static str>) -> Item {
    Item {
      code,
      name,
      tags: Vec::new(),
      description: None,
    }
  }

  fn fields(item: &Item) -> SearchFields<'_> {
    SearchFields {
      name: item.name,
      tags: item.tags.clone(),
      code: item.code,
      description: item.description,
    }
  }

  #[test]
  fn test_exact_code_beats_name_prefix() {
    let items = vec![item("P010", Some("P001X")), item("P001", Some("Filtro"))];
    let ranked = rank(items, "P001", fields);
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].code, "P001");
  }

  #[test]
  fn test_case_insensitive() {
    let ranked = rank(vec![item("ABC", Some("Filtro de Oleo"))], "filtro", fields);
    assert_eq!(ranked.len(), 1);
  }

  #[test]
  fn test_non_matching_items_dropped() {
    let ranked = rank(vec![item("P001", None), item("X9", None)], "p0", fields);
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].code, "P001");
  }

  #[test]
  fn test_field_priority_breaks_ties() {
    let by_description = Item {
      code: "A",
      name: None,
      tags: Vec::new(),
      description: Some("bomba"),
    };
    let by_tag = Item {
      code: "B",
      name: None,
      tags: vec!["bomba"],
      description: None,
    };
    let by_name = item("C", Some("bomba"));
    let ranked = rank(vec![by_description, by_tag, by_name], "bomba", fields);
    let codes: Vec<_> = ranked.iter().map(|i| i.code).collect();
    assert_eq!(codes, vec!["C", "B", "A"]);
  }

  #[test]
  fn test_exact_tag_beats_description_prefix() {
    let by_description = Item {
      code: "A",
      name: None,
      tags: Vec::new(),
      description: Some("oleo de motor"),
    };
    let by_tag = Item {
      code: "B",
      name: None,
      tags: vec!["filtro", "oleo"],
      description: None,
    };
    let ranked = rank(vec![by_description, by_tag], "oleo", fields);
    let codes: Vec<_> = ranked.iter().map(|i| i.code).collect();
    assert_eq!(codes, vec!["B", "A"]);
  }

  #[test]
  fn test_best_tag_wins() {
    let fields = SearchFields {
      tags: vec!["filtros", "filtro"],
      code: "X",
      ..Default::default()
    };
    assert_eq!(score(&fields, "filtro"), Some(1));
  }

  #[test]
  fn test_substring_ranks_after_prefix() {
    let items = vec![item("XP1", None), item("P1X", None)];
    let ranked = rank(items, "p1", fields);
    assert_eq!(ranked[0].code, "P1X");
  }

  #[test]
  fn test_empty_query_keeps_everything_in_order() {
    let ranked = rank(vec![item("B", None), item("A", None)], "  ", fields);
    let codes: Vec<_> = ranked.iter().map(|i| i.code).collect();
    assert_eq!(codes, vec!["B", "A"]);
  }
}
