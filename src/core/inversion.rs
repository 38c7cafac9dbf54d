use crate::domain::model::{normalize_name, InversionResult};
use crate::domain::ports::ReferenceNameStore;
use crate::utils::error::{EtlError, Result};
use std::future::Future;
use std::time::Duration;

/// 以可選的期限包住一次參考表查詢
pub(crate) async fn with_deadline<T, F>(name: &str, timeout: Option<Duration>, lookup: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, lookup)
            .await
            .map_err(|_| EtlError::LookupTimeout {
                name: name.to_string(),
                timeout_ms: limit.as_millis(),
            })?,
        None => lookup.await,
    }
}

/// 判斷名字與姓氏是否被填反
pub struct InversionResolver<'a, R: ReferenceNameStore + ?Sized> {
    store: &'a R,
    lookup_timeout: Option<Duration>,
}

impl<'a, R: ReferenceNameStore + ?Sized> InversionResolver<'a, R> {
    pub fn new(store: &'a R) -> Self {
        Self {
            store,
            lookup_timeout: None,
        }
    }

    pub fn with_lookup_timeout(mut self, lookup_timeout: Option<Duration>) -> Self {
        self.lookup_timeout = lookup_timeout;
        self
    }

    /// 只有「姓氏欄是已知名字，且名字欄不是」才判定為顛倒。
    /// 兩者皆已知或皆未知時不做更正。
    pub async fn resolve(&self, first_name: &str, last_name: &str) -> Result<InversionResult> {
        let unchanged = InversionResult {
            inverted: false,
            first: first_name.to_string(),
            last: last_name.to_string(),
        };

        if first_name.is_empty() || last_name.is_empty() {
            return Ok(unchanged);
        }

        let last_key = normalize_name(last_name);
        let first_key = normalize_name(first_name);

        // 兩次查詢都必須完成才能判斷，不做短路
        let (last_is_first_name, first_is_first_name) = tokio::join!(
            with_deadline(last_name, self.lookup_timeout, self.store.exists(&last_key)),
            with_deadline(first_name, self.lookup_timeout, self.store.exists(&first_key)),
        );
        let last_is_first_name = last_is_first_name?;
        let first_is_first_name = first_is_first_name?;

        if last_is_first_name && !first_is_first_name {
            return Ok(InversionResult {
                inverted: true,
                first: last_name.to_string(),
                last: first_name.to_string(),
            });
        }

        Ok(unchanged)
    }
}
