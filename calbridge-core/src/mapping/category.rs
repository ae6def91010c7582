//! Host category string ⇄ CATEGORIES.

use crate::config::MappingConfiguration;
use crate::host::HostCalendarItem;

/// Remote category list for `item`, without the filter category when the
/// item was selected by it.
pub fn categories_outbound(config: &MappingConfiguration, item: &HostCalendarItem) -> Vec<String> {
    let filter = config.injected_filter_category();
    item.category_list(&config.category_separator)
        .into_iter()
        .filter(|c| filter.is_none_or(|f| !c.eq_ignore_ascii_case(f)))
        .collect()
}

/// Host category string for `categories`. The filter category is appended
/// when missing so the item stays selected by the filtered sync.
pub fn categories_inbound(config: &MappingConfiguration, categories: &[String]) -> String {
    let mut names: Vec<&str> = categories
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect();

    if let Some(filter) = config.injected_filter_category() {
        if !names.iter().any(|c| c.eq_ignore_ascii_case(filter)) {
            names.push(filter);
        }
    }

    names.join(&format!("{} ", config.category_separator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::test_support::timed_item;

    fn filtered() -> MappingConfiguration {
        MappingConfiguration {
            use_category_as_filter: true,
            filter_category_name: "Sync".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_plain_categories_roundtrip() {
        let config = MappingConfiguration::default();
        let mut item = timed_item(2025, 3, 3, 9);
        item.categories = "Work, Travel,".into();

        let remote = categories_outbound(&config, &item);
        assert_eq!(remote, vec!["Work", "Travel"]);
        assert_eq!(categories_inbound(&config, &remote), "Work, Travel");
    }

    #[test]
    fn test_filter_category_is_stripped_and_reinjected() {
        let config = filtered();
        let mut item = timed_item(2025, 3, 3, 9);
        item.categories = "Work, sync".into();

        let mut remote = categories_outbound(&config, &item);
        assert_eq!(remote, vec!["Work"]);

        remote.push("Private".into());
        assert_eq!(categories_inbound(&config, &remote), "Work, Private, Sync");
    }

    #[test]
    fn test_inverted_filter_keeps_categories_as_is() {
        let config = MappingConfiguration {
            invert_category_filter: true,
            ..filtered()
        };
        let mut item = timed_item(2025, 3, 3, 9);
        item.categories = "Sync".into();
        assert_eq!(categories_outbound(&config, &item), vec!["Sync"]);
        assert_eq!(categories_inbound(&config, &[]), "");
    }

    #[test]
    fn test_custom_separator() {
        let config = MappingConfiguration {
            category_separator: ";".into(),
            ..Default::default()
        };
        assert_eq!(
            categories_inbound(&config, &["A".to_string(), "B".to_string()]),
            "A; B"
        );
    }
}
