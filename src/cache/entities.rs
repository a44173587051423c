//! Local store implementations for the domain entities.

use crate::models::{FleetTag, Part, TimeRecord};
use crate::search::SearchFields;

use super::traits::{Cacheable, ReferenceEntity};

// ============================================================================
// Reference data
// ============================================================================

impl Cacheable for Part {
  fn cache_key(&self) -> &str {
    &self.id
  }

  fn entity_type() -> &'static str {
    "parts"
  }
}

impl ReferenceEntity for Part {
  fn remote_table() -> &'static str {
    "parts"
  }

  fn order_column() -> &'static str {
    "code"
  }

  fn key_column() -> &'static str {
    "code"
  }

  fn search_fields(&self) -> SearchFields<'_> {
    SearchFields {
      name: self.name.as_deref(),
      tags: self.tag_list(),
      code: &self.code,
      description: Some(&self.description),
    }
  }
}

impl Cacheable for FleetTag {
  fn cache_key(&self) -> &str {
    &self.id
  }

  fn entity_type() -> &'static str {
    "fleet_tags"
  }
}

impl ReferenceEntity for FleetTag {
  fn remote_table() -> &'static str {
    "fleet_tags"
  }

  fn order_column() -> &'static str {
    "number"
  }

  fn key_column() -> &'static str {
    "number"
  }

  fn search_fields(&self) -> SearchFields<'_> {
    SearchFields {
      name: None,
      tags: Vec::new(),
      code: &self.number,
      description: self.description.as_deref(),
    }
  }
}

// ============================================================================
// Operational data
// ============================================================================

impl Cacheable for TimeRecord {
  fn cache_key(&self) -> &str {
    &self.id
  }

  fn entity_type() -> &'static str {
    "time_records"
  }
}
