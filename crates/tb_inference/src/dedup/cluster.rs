use std::collections::HashSet;

use serde::Serialize;
use tb_core::config::{ClusterLinkage, DedupConfig};
use tb_core::Article;

use super::text::{jaccard, word_set};
use super::Deduplicate;

/// Articles judged to report the same event. The first one represents the group.
#[derive(Debug, Clone, PartialEq)]
pub struct EventGroup {
    articles: Vec<Article>,
}

impl EventGroup {
    pub fn representative(&self) -> Option<&Article> {
        self.articles.first()
    }

    pub fn into_representative(self) -> Option<Article> {
        self.articles.into_iter().next()
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregationStats {
    pub total_articles: usize,
    pub total_events: usize,
    pub avg_event_size: f64,
    pub max_event_size: usize,
    pub min_event_size: usize,
    pub single_article_events: usize,
    pub multi_article_events: usize,
}

impl AggregationStats {
    pub fn from_groups(groups: &[EventGroup]) -> Self {
        if groups.is_empty() {
            return Self::default();
        }
        let sizes: Vec<usize> = groups.iter().map(EventGroup::len).collect();
        let total_articles: usize = sizes.iter().sum();
        Self {
            total_articles,
            total_events: groups.len(),
            avg_event_size: total_articles as f64 / groups.len() as f64,
            max_event_size: sizes.iter().copied().max().unwrap_or(0),
            min_event_size: sizes.iter().copied().min().unwrap_or(0),
            single_article_events: sizes.iter().filter(|&&s| s == 1).count(),
            multi_article_events: sizes.iter().filter(|&&s| s > 1).count(),
        }
    }
}

struct Signature {
    title: HashSet<String>,
    with_description: Option<HashSet<String>>,
}

impl Signature {
    fn of(article: &Article) -> Self {
        Self {
            title: word_set(&article.title),
            with_description: article
                .short_description()
                .map(|d| word_set(&format!("{} {}", article.title, d))),
        }
    }
}

/// Groups articles covering the same event by word-set similarity.
#[derive(Debug, Clone)]
pub struct EventClusterer {
    threshold: f64,
    linkage: ClusterLinkage,
}

impl EventClusterer {
    pub fn new(threshold: f64, linkage: ClusterLinkage) -> Self {
        Self { threshold, linkage }
    }

    pub fn from_config(config: &DedupConfig) -> Self {
        Self::new(config.similarity_threshold, config.linkage)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Title similarity, raised to the title+description similarity when that is higher.
    pub fn similarity(&self, a: &Article, b: &Article) -> f64 {
        self.signature_similarity(&Signature::of(a), &Signature::of(b))
    }

    fn signature_similarity(&self, a: &Signature, b: &Signature) -> f64 {
        let title = jaccard(&a.title, &b.title);
        if title >= self.threshold {
            return title;
        }
        match (&a.with_description, &b.with_description) {
            (Some(a), Some(b)) => title.max(jaccard(a, b)),
            _ => title,
        }
    }

    /// Partitions the articles into event groups. Groups and their members keep input order.
    pub fn cluster(&self, articles: Vec<Article>) -> Vec<EventGroup> {
        let signatures: Vec<Signature> = articles.iter().map(Signature::of).collect();
        let index_groups = match self.linkage {
            ClusterLinkage::Anchor => self.anchor_groups(&signatures),
            ClusterLinkage::Transitive => self.transitive_groups(&signatures),
        };

        let mut slots: Vec<Option<Article>> = articles.into_iter().map(Some).collect();
        index_groups
            .into_iter()
            .map(|indices| EventGroup {
                articles: indices.into_iter().filter_map(|i| slots[i].take()).collect(),
            })
            .filter(|group| !group.is_empty())
            .collect()
    }

    pub fn stats(&self, groups: &[EventGroup]) -> AggregationStats {
        AggregationStats::from_groups(groups)
    }

    fn matches(&self, signatures: &[Signature], i: usize, j: usize) -> bool {
        self.signature_similarity(&signatures[i], &signatures[j]) >= self.threshold
    }

    fn anchor_groups(&self, signatures: &[Signature]) -> Vec<Vec<usize>> {
        let mut processed = vec![false; signatures.len()];
        let mut groups = Vec::new();
        for anchor in 0..signatures.len() {
            if processed[anchor] {
                continue;
            }
            processed[anchor] = true;
            let mut group = vec![anchor];
            for other in anchor + 1..signatures.len() {
                if !processed[other] && self.matches(signatures, anchor, other) {
                    processed[other] = true;
                    group.push(other);
                }
            }
            groups.push(group);
        }
        groups
    }

    fn transitive_groups(&self, signatures: &[Signature]) -> Vec<Vec<usize>> {
        let n = signatures.len();
        let mut sets = DisjointSets::new(n);
        for i in 0..n {
            for j in i + 1..n {
                if self.matches(signatures, i, j) {
                    sets.union(i, j);
                }
            }
        }

        let mut root_to_group: Vec<Option<usize>> = vec![None; n];
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for i in 0..n {
            let root = sets.find(i);
            match root_to_group[root] {
                Some(g) => groups[g].push(i),
                None => {
                    root_to_group[root] = Some(groups.len());
                    groups.push(vec![i]);
                }
            }
        }
        groups
    }
}

impl Deduplicate for EventClusterer {
    fn name(&self) -> &str {
        "clustering"
    }

    fn deduplicate(&self, articles: Vec<Article>) -> Vec<Article> {
        self.cluster(articles)
            .into_iter()
            .filter_map(EventGroup::into_representative)
            .collect()
    }
}

struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // lower index stays root so group order follows input order
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}
