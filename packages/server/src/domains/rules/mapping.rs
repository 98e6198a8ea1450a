//! Destination property construction.
//!
//! Pure: a routing decision plus a capture timestamp becomes the full
//! property map for the downstream write. No I/O here; the worker gets
//! a payload it can retry without recomputation.

use chrono::{DateTime, Utc};
use notion::{Properties, PropertyValue};

use super::engine::RouteDecision;

/// Build the page properties for a matched text message.
pub fn build_text_properties(decision: &RouteDecision, captured_at: DateTime<Utc>) -> Properties {
    let mapping = &decision.mapping;
    let mut properties = Properties::new();

    properties.insert(
        mapping.title_property.clone(),
        PropertyValue::title(decision.cleaned_text.clone()),
    );

    if let Some(date_property) = &mapping.date_property {
        properties.insert(
            date_property.clone(),
            PropertyValue::date(captured_at.format("%Y-%m-%d").to_string()),
        );
    }

    if let Some(tag_property) = &mapping.tag_property {
        if !mapping.tags.is_empty() {
            properties.insert(
                tag_property.clone(),
                PropertyValue::multi_select(mapping.tags.iter().cloned()),
            );
        }
    }

    for (name, value) in &mapping.custom_fields {
        properties.insert(name.clone(), PropertyValue::rich_text(value.clone()));
    }

    properties
}
