//! KPI expression expansion.
//!
//! A KPI's formula references fact names as bare identifiers. Expansion
//! substitutes each whole-word, case-insensitive occurrence with that
//! fact's aggregate fragment rendered by the dialect; everything else
//! passes through unchanged. The result is not validated as SQL before
//! execution; a downstream syntax error surfaces as an execution failure.

use anyhow::Context;
use regex::Regex;

use crate::dialect::Dialect;
use crate::error::Result;
use crate::models::Fact;

#[derive(Debug, Clone)]
pub struct ExpandedKpi {
    pub sql: String,
    /// Ids of the facts the expression referenced, in order of first
    /// occurrence. The first one fixes the query's base table.
    pub fact_ids: Vec<i64>,
}

pub fn expand(expression: &str, facts: &[&Fact], dialect: &dyn Dialect) -> Result<ExpandedKpi> {
    if facts.is_empty() {
        return Ok(ExpandedKpi {
            sql: expression.to_string(),
            fact_ids: Vec::new(),
        });
    }

    // Longest names first so "net_revenue" never half-matches "revenue".
    let mut names: Vec<&str> = facts.iter().map(|f| f.name.as_str()).collect();
    names.sort_by_key(|n| std::cmp::Reverse(n.len()));
    let alternation = names
        .iter()
        .map(|n| regex::escape(n))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = Regex::new(&format!(r"(?i)\b({alternation})\b"))
        .context("building KPI substitution pattern")?;

    let mut fact_ids = Vec::new();
    // One pass over the original text; replacements are never re-matched,
    // so a table or column that happens to share a fact's name is safe.
    let sql = pattern
        .replace_all(expression, |caps: &regex::Captures<'_>| {
            let matched = &caps[1];
            let fact = facts
                .iter()
                .find(|f| f.name.eq_ignore_ascii_case(matched))
                .copied();
            match fact {
                Some(fact) => {
                    if !fact_ids.contains(&fact.id) {
                        fact_ids.push(fact.id);
                    }
                    let column = format!(
                        "{}.{}",
                        dialect.quote_ident(&fact.table),
                        dialect.quote_ident(&fact.column)
                    );
                    dialect.render_aggregation(fact.aggregate, &column)
                }
                None => matched.to_string(),
            }
        })
        .into_owned();

    Ok(ExpandedKpi { sql, fact_ids })
}
