// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Generation-scoped exception deduplication.
//!
//! An error graph is often walked several times during one unit of work:
//! the same error is logged by several layers, and every walk visits its
//! sources and its base (innermost) error again. An [`ExceptionRecorder`]
//! records each distinct node exactly once and renders its text once.
//!
//! Node identity is the address of the error object together with its type
//! label and message. Every root error is retained by the recorder until the
//! generation ends, so an address can never be recycled by another error
//! while it is still tracked. A recorder lives for exactly one context
//! generation; resetting the context drops it together with its identities.

use crate::event::{debug_type_label, ErrorRef, SharedError};
use crate::payload::ExceptionEntry;
use std::collections::HashSet;
use std::error::Error;
use std::sync::Arc;

pub const BASE_EXCEPTION_HEADER: &str = "Base Exception:";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NodeKey {
    address: usize,
    label: String,
    message: String,
}

impl NodeKey {
    fn of(error: &(dyn Error + 'static)) -> Self {
        Self {
            address: error as *const dyn Error as *const () as usize,
            label: debug_type_label(error),
            message: error.to_string(),
        }
    }
}

#[derive(Default)]
pub struct ExceptionRecorder {
    seen: HashSet<NodeKey>,
    retained_roots: HashSet<usize>,
    retained: Vec<SharedError>,
    entries: Vec<ExceptionEntry>,
}

impl ExceptionRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `root`, its source chain and its base error.
    ///
    /// Text for newly seen nodes is appended to `text`; nodes already seen in
    /// this generation contribute neither an entry nor text, but the walk
    /// still continues below them.
    pub fn record(&mut self, root: &ErrorRef, text: &mut String) {
        self.retain(root.error());
        let root_node: &(dyn Error + 'static) = root.error().as_ref();

        let chain = source_chain(root_node);
        self.record_node(root_node, root.type_name(), &chain, None, text);

        let Some((base, intermediates)) = chain.split_last() else {
            return;
        };

        for node in intermediates {
            let key = NodeKey::of(*node);
            if self.seen.insert(key) {
                self.push_entry(&debug_type_label(*node), *node);
            }
        }

        let base_chain = source_chain(*base);
        self.record_node(
            *base,
            &debug_type_label(*base),
            &base_chain,
            Some(BASE_EXCEPTION_HEADER),
            text,
        );
    }

    #[must_use]
    pub fn entries(&self) -> &[ExceptionEntry] {
        &self.entries
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<ExceptionEntry> {
        self.entries
    }

    fn record_node(
        &mut self,
        node: &(dyn Error + 'static),
        type_name: &str,
        chain: &[&(dyn Error + 'static)],
        header: Option<&str>,
        text: &mut String,
    ) {
        if !self.seen.insert(NodeKey::of(node)) {
            return;
        }

        self.push_entry(type_name, node);

        if let Some(header) = header {
            text.push_str(header);
            text.push('\n');
        }
        text.push_str(&render(node, type_name, chain));
        text.push('\n');
    }

    fn push_entry(&mut self, type_name: &str, node: &(dyn Error + 'static)) {
        self.entries.push(ExceptionEntry {
            exception_type: type_name.to_string(),
            exception_message: node.to_string(),
        });
    }

    fn retain(&mut self, error: &SharedError) {
        let address = Arc::as_ptr(error) as *const () as usize;
        if self.retained_roots.insert(address) {
            self.retained.push(Arc::clone(error));
        }
    }

    /// Number of distinct root errors kept alive for this generation.
    #[must_use]
    pub fn retained_roots(&self) -> usize {
        self.retained.len()
    }
}

/// Sources of `root`, outermost first, stopping at the first revisited node.
fn source_chain<'a>(root: &'a (dyn Error + 'static)) -> Vec<&'a (dyn Error + 'static)> {
    let mut visited = HashSet::from([NodeKey::of(root)]);
    let mut chain = Vec::new();

    let mut current = root.source();
    while let Some(node) = current {
        if !visited.insert(NodeKey::of(node)) {
            break;
        }
        chain.push(node);
        current = node.source();
    }
    chain
}

fn render(node: &(dyn Error + 'static), type_name: &str, chain: &[&(dyn Error + 'static)]) -> String {
    let mut rendered = format!("{type_name}: {node}");
    for source in chain {
        rendered.push_str(&format!(
            "\n ---> {}: {}",
            debug_type_label(*source),
            source
        ));
    }
    rendered
}
