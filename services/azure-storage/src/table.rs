//! Locating telemetry tables and building OData filters for them.

use std::fmt::Write;

use sapmon_core::time::{to_dotnet_ticks, DateTime};

/// Prefix of the per period one-minute metrics tables written by the diagnostics extension.
pub const METRICS_TABLE_PREFIX: &str = "WADMetricsPT1MP10DV2S";

/// Table holding the performance counters written by the diagnostics extension.
pub const PERFORMANCE_COUNTERS_TABLE: &str = "WADPerformanceCountersTable";

/// Ticks of `DateTime.MaxValue`, used by row keys sorted newest first.
const MAX_DOTNET_TICKS: i64 = 3_155_378_975_999_999_999;

/// Which table to query and what to look for in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFilter {
    /// Exact table name, or a name prefix when `use_prefix_scan` is set.
    pub table_name_or_prefix: String,
    /// Select the table by prefix instead of exact name.
    pub use_prefix_scan: bool,
    /// OData `$filter` expression sent with the query.
    pub odata_filter_expression: String,
}

impl TableFilter {
    /// Query the table named exactly `table`.
    pub fn exact(table: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            table_name_or_prefix: table.into(),
            use_prefix_scan: false,
            odata_filter_expression: filter.into(),
        }
    }

    /// Query the first table, in ascending order, whose name starts with `prefix`.
    pub fn prefix(prefix: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            table_name_or_prefix: prefix.into(),
            use_prefix_scan: true,
            odata_filter_expression: filter.into(),
        }
    }

    /// Pick the table to query among `tables`.
    ///
    /// Returns `None` when no table matches yet.
    pub fn select_table<'a>(&self, tables: &'a [String]) -> Option<&'a str> {
        if !self.use_prefix_scan {
            return tables
                .iter()
                .find(|v| **v == self.table_name_or_prefix)
                .map(String::as_str);
        }

        tables
            .iter()
            .filter(|v| v.starts_with(&self.table_name_or_prefix))
            .min()
            .map(String::as_str)
    }
}

/// Quote `value` as an OData string literal.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Encode a resource id the way the diagnostics extension builds partition keys.
///
/// Every character that is not an ASCII letter or digit becomes `:` followed
/// by its UTF-16 code unit as four upper-case hex digits.
pub fn encode_partition_key(value: &str) -> String {
    let mut s = String::with_capacity(value.len() * 2);
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            s.push(c);
            continue;
        }

        let mut units = [0u16; 2];
        for unit in c.encode_utf16(&mut units) {
            let _ = write!(s, ":{unit:04X}");
        }
    }
    s
}

/// Row key bound for tables keyed newest first.
pub fn reverse_ticks(time: DateTime) -> i64 {
    MAX_DOTNET_TICKS.saturating_sub(to_dotnet_ticks(time))
}

/// Filter matching metrics rows of `resource_id` written after `since`.
pub fn metrics_filter(resource_id: &str, since: DateTime) -> String {
    format!(
        "PartitionKey eq {} and RowKey lt {}",
        quote(&encode_partition_key(resource_id)),
        quote(&format!("{:019}", reverse_ticks(since)))
    )
}

/// Filter matching performance counter rows of a VM written after `since`.
pub fn performance_counters_filter(
    deployment_id: &str,
    role_instance: &str,
    since: DateTime,
) -> String {
    format!(
        "Role eq 'IaaS' and DeploymentId eq {} and RoleInstance eq {} and PartitionKey gt {}",
        quote(deployment_id),
        quote(role_instance),
        quote(&format!("0{:019}", to_dotnet_ticks(since)))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn tables(names: &[&str]) -> Vec<String> {
        names.iter().map(|v| v.to_string()).collect()
    }

    fn since() -> DateTime {
        chrono::Utc.with_ymd_and_hms(2022, 3, 1, 8, 12, 34).unwrap()
    }

    #[test]
    fn test_select_prefix_takes_lowest_name() {
        let filter = TableFilter::prefix(METRICS_TABLE_PREFIX, "");
        let names = tables(&[
            "WADMetricsPT1MP10DV2S20220310",
            PERFORMANCE_COUNTERS_TABLE,
            "WADMetricsPT1MP10DV2S20220301",
            "WADMetricsPT1HP10DV2S20220301",
        ]);

        assert_eq!(
            filter.select_table(&names),
            Some("WADMetricsPT1MP10DV2S20220301")
        );
    }

    #[test_case(&[PERFORMANCE_COUNTERS_TABLE], true; "present")]
    #[test_case(&["WADPerformanceCountersTable2"], false; "only longer name")]
    #[test_case(&[], false; "no tables")]
    fn test_select_exact(names: &[&str], found: bool) {
        let filter = TableFilter::exact(PERFORMANCE_COUNTERS_TABLE, "");
        assert_eq!(filter.select_table(&tables(names)).is_some(), found);
    }

    #[test]
    fn test_select_prefix_without_match() {
        let filter = TableFilter::prefix(METRICS_TABLE_PREFIX, "");
        assert_eq!(filter.select_table(&tables(&["SchemasTable"])), None);
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("sap"), "'sap'");
        assert_eq!(quote("o'brien"), "'o''brien'");
    }

    #[test]
    fn test_encode_partition_key() {
        assert_eq!(
            encode_partition_key("/subscriptions/s-1/vm"),
            ":002Fsubscriptions:002Fs:002D1:002Fvm"
        );
        assert_eq!(encode_partition_key("abc123"), "abc123");
        assert_eq!(encode_partition_key("é"), ":00E9");
    }

    #[test]
    fn test_performance_counters_filter() {
        assert_eq!(
            performance_counters_filter("dep-1", "sapvm", since()),
            "Role eq 'IaaS' and DeploymentId eq 'dep-1' and RoleInstance eq 'sapvm' and PartitionKey gt '00637817191540000000'"
        );
    }

    #[test]
    fn test_metrics_filter() {
        assert_eq!(
            metrics_filter("/vm", since()),
            "PartitionKey eq ':002Fvm' and RowKey lt '2517561784459999999'"
        );
    }
}
