use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use serde::{Serialize, Deserialize};

use crate::crawler::task::ProfileMatch;

const TOP_N: usize = 5;

/// Summary computed once from the result store when a task finishes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub basic_stats: BasicStats,
    pub top_profiles: Vec<ProfileCount>,
    pub keyword_effectiveness: Vec<KeywordCount>,
    pub top_companies: Vec<CompanyCount>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicStats {
    pub total_companies: usize,
    pub total_keywords: usize,
    pub total_profiles: usize,
    pub unique_profiles: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileCount {
    pub name: String,
    pub href: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordCount {
    pub keyword: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyCount {
    pub company: String,
    pub count: usize,
}

impl Statistics {
    /// All-zero payload for runs that saved nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Aggregate the stored rows. Rankings are by descending count, ties keep first-seen order.
    pub fn from_rows(rows: &[ProfileMatch], total_companies: usize, total_keywords: usize) -> Self {
        let unique_profiles = rows.iter().map(|r| r.href.as_str()).collect::<HashSet<_>>().len();

        let top_profiles = ranked(rows.iter().map(|r| (r.name.clone(), r.href.clone())))
            .into_iter()
            .take(TOP_N)
            .map(|((name, href), count)| ProfileCount { name, href, count })
            .collect();

        let keyword_effectiveness = ranked(rows.iter().map(|r| r.keyword.clone()))
            .into_iter()
            .map(|(keyword, count)| KeywordCount { keyword, count })
            .collect();

        let top_companies = ranked(rows.iter().map(|r| r.company.clone()))
            .into_iter()
            .take(TOP_N)
            .map(|(company, count)| CompanyCount { company, count })
            .collect();

        Self {
            basic_stats: BasicStats {
                total_companies,
                total_keywords,
                total_profiles: rows.len(),
                unique_profiles,
            },
            top_profiles,
            keyword_effectiveness,
            top_companies,
        }
    }

    /// Human-readable block appended to the task log
    pub fn summary(&self) -> String {
        format!(
            "Statistics Summary:\n\
             - Total Companies Searched: {}\n\
             - Total Keywords Used: {}\n\
             - Total Profiles Found: {}\n\
             - Unique Profiles Found: {}",
            self.basic_stats.total_companies,
            self.basic_stats.total_keywords,
            self.basic_stats.total_profiles,
            self.basic_stats.unique_profiles,
        )
    }
}

/// Count occurrences, then sort by count descending. The sort is stable over first-seen order.
fn ranked<K, I>(keys: I) -> Vec<(K, usize)>
where
    K: Eq + Hash + Clone,
    I: IntoIterator<Item = K>,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut counts: Vec<(K, usize)> = Vec::new();

    for key in keys {
        match index.get(&key) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(key.clone(), counts.len());
                counts.push((key, 1));
            }
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}
