//! Single owner of the filter state consulted by producers.
//!
//! The engine pushes each applied configuration's filters through
//! [`FilterAuthority::apply`]; producers read a lock-free snapshot.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::DispatcherConfig;
use crate::config::TagFilter;
use crate::entry::LogFilter;
use crate::entry::LogLevel;
use crate::entry::TagSet;

#[derive(Debug, Clone, Default, PartialEq)]
struct FilterState {
    minimal: LogFilter,
    tag_filters: Vec<(TagSet, LogFilter)>,
}

#[derive(Debug, Clone, Default)]
pub struct FilterAuthority {
    state: Arc<ArcSwap<FilterState>>,
}

impl FilterAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(
        &self,
        minimal: LogFilter,
        tag_filters: &[TagFilter],
    ) {
        let state = FilterState {
            minimal,
            tag_filters: tag_filters.iter().map(|t| (t.tag_set(), t.filter)).collect(),
        };
        self.state.store(Arc::new(state));
    }

    pub fn apply_config(
        &self,
        config: &DispatcherConfig,
    ) {
        self.apply(config.minimal_filter, &config.tag_filters);
    }

    pub fn minimal_filter(&self) -> LogFilter {
        self.state.load().minimal
    }

    /// Filter of the first tag filter whose tags are all carried by `tags`,
    /// otherwise the minimal filter.
    pub fn effective_filter(
        &self,
        tags: &TagSet,
    ) -> LogFilter {
        let state = self.state.load();
        if !tags.is_empty() {
            for (filter_tags, filter) in &state.tag_filters {
                if tags.is_superset_of(filter_tags) {
                    return *filter;
                }
            }
        }
        state.minimal
    }

    pub fn should_log_line(
        &self,
        level: LogLevel,
        tags: &TagSet,
    ) -> bool {
        self.effective_filter(tags).line.accepts(level)
    }

    pub fn should_open_group(
        &self,
        level: LogLevel,
        tags: &TagSet,
    ) -> bool {
        self.effective_filter(tags).group.accepts(level)
    }
}
