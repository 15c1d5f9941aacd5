//! Client-side narrowing and ordering of the fetched seed page.
//!
//! The remote query decides which page the store returns; the local filter
//! and sort here only reshape that page and never trigger a fetch.

use crate::Seed;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Id,
    Content,
    Source,
    Tag,
    Score,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortKey {
    /// Column order of the seed table.
    pub const COLUMNS: [SortKey; 6] = [
        SortKey::Id,
        SortKey::Content,
        SortKey::Source,
        SortKey::Tag,
        SortKey::Score,
        SortKey::CreatedAt,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SortKey::Id => "ID",
            SortKey::Content => "Content",
            SortKey::Source => "Source",
            SortKey::Tag => "Tag",
            SortKey::Score => "Score",
            SortKey::CreatedAt => "Created",
        }
    }
}

impl SortDir {
    pub fn flip(self) -> Self {
        match self {
            SortDir::Asc => SortDir::Desc,
            SortDir::Desc => SortDir::Asc,
        }
    }

    pub fn indicator(self) -> &'static str {
        match self {
            SortDir::Asc => " ▲",
            SortDir::Desc => " ▼",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortState {
    pub key: SortKey,
    pub dir: SortDir,
}

impl SortState {
    pub fn new(key: SortKey, dir: SortDir) -> Self {
        Self { key, dir }
    }

    /// Header click semantics: the active column flips direction, any other
    /// column becomes active in ascending order.
    pub fn toggle(self, key: SortKey) -> Self {
        if self.key == key {
            Self {
                key,
                dir: self.dir.flip(),
            }
        } else {
            Self {
                key,
                dir: SortDir::Asc,
            }
        }
    }

    pub fn indicator(&self, column: SortKey) -> &'static str {
        if self.key == column {
            self.dir.indicator()
        } else {
            ""
        }
    }
}

/// Case-insensitive substring match on `content`. An empty query matches all.
pub fn matches_query(seed: &Seed, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    seed.content.to_lowercase().contains(&query.to_lowercase())
}

/// Filter then stable-sort. Descending negates the comparator instead of
/// reversing the list, so equal keys keep their input order either way.
pub fn filter_and_sort<'a>(seeds: &'a [Seed], query: &str, sort: SortState) -> Vec<&'a Seed> {
    let mut rows: Vec<&Seed> = seeds.iter().filter(|seed| matches_query(seed, query)).collect();

    rows.sort_by(|a, b| {
        let cmp = compare_by(a, b, sort.key);
        match sort.dir {
            SortDir::Asc => cmp,
            SortDir::Desc => cmp.reverse(),
        }
    });
    rows
}

fn compare_by(a: &Seed, b: &Seed, key: SortKey) -> Ordering {
    match key {
        SortKey::Id => a.id.cmp(&b.id),
        SortKey::Score => a.score.total_cmp(&b.score),
        SortKey::Content => collate(&a.content, &b.content),
        SortKey::Source => collate(a.meta_str("source"), b.meta_str("source")),
        SortKey::Tag => collate(a.meta_str("tag"), b.meta_str("tag")),
        SortKey::CreatedAt => collate(&a.created_at, &b.created_at),
    }
}

/// Text order that ignores case first and only falls back to the raw code
/// points to separate strings differing in case alone.
pub fn collate(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| a.cmp(b))
}
