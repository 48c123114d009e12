use streamlog_core::{StreamName, category};
use streamlog_events::MetadataMatcher;

use crate::event_store::EventStore;

/// Which streams a projection reads, resolved anew on every pass.
#[derive(Debug, Clone)]
pub(crate) enum Selector {
    Stream {
        name: StreamName,
        matcher: Option<MetadataMatcher>,
    },
    Streams(Vec<StreamName>),
    Categories(Vec<String>),
    All,
}

impl Selector {
    /// Candidate streams in selector order.
    pub(crate) fn resolve(&self, store: &dyn EventStore) -> Vec<StreamName> {
        match self {
            Selector::Stream { name, .. } => vec![name.clone()],
            Selector::Streams(names) => names.clone(),
            Selector::Categories(categories) => {
                let names = store.list_stream_names();
                categories
                    .iter()
                    .flat_map(|wanted| {
                        names
                            .iter()
                            .filter(move |name| category(name.as_str()) == Some(wanted.as_str()))
                            .cloned()
                    })
                    .collect()
            }
            Selector::All => store
                .list_stream_names()
                .into_iter()
                .filter(|name| !name.as_str().starts_with('$'))
                .collect(),
        }
    }

    pub(crate) fn matcher(&self) -> Option<&MetadataMatcher> {
        match self {
            Selector::Stream { matcher, .. } => matcher.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn is_merged(&self) -> bool {
        matches!(self, Selector::Streams(_))
    }
}
