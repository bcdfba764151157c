//! 订阅拉取 (Subscription Fetching)
//!
//! 并发获取订阅文本；单个链接失败只记录日志，不影响其他链接。

use std::collections::HashSet;
use std::time::Duration;

use futures::{StreamExt, stream};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::core::config::FetchConfig;
use crate::core::error::{FetchError, Result};
use crate::interfaces::SubscriptionSource;
use crate::network::retry::RetryPolicy;

/// 订阅拉取器
pub struct Subscriber {
    client: Client,
    concurrency: usize,
    retry: RetryPolicy<FetchError>,
}

impl Subscriber {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build()?;
        Ok(Self {
            client,
            concurrency: config.concurrency.max(1),
            retry: RetryPolicy::new(
                config.max_attempts,
                Duration::from_millis(config.backoff_ms),
                FetchError::is_transient,
            ),
        })
    }

    /// 单次 GET，非 2xx 视为失败
    async fn get_text(&self, url: &str) -> std::result::Result<String, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                url: url.to_string(),
            });
        }
        Ok(resp.text().await?)
    }

    /// 带重试地拉取单个订阅；失败返回 `None`
    pub async fn fetch_one(&self, url: &str) -> Option<String> {
        debug!("拉取订阅: {}", url);
        match self.retry.run(url, || self.get_text(url)).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("订阅拉取失败 {}: {}", url, e);
                None
            }
        }
    }

    /// 展开聚合订阅并与直接配置的链接合并，保序去重
    pub async fn collect_urls(&self, source: &dyn SubscriptionSource) -> Vec<String> {
        let mut urls = source.subscriptions();
        if let Some(agg) = source.aggregator()
            && let Some(list) = self.fetch_one(&agg).await
        {
            let extra = aggregator_lines(&list);
            info!("聚合订阅提供 {} 个链接", extra.len());
            urls.extend(extra);
        }

        let mut seen = HashSet::new();
        urls.retain(|u| seen.insert(u.clone()));
        urls
    }

    /// 并发拉取全部订阅，返回成功获取的文本 (完成顺序)
    pub async fn fetch_all(&self, source: &dyn SubscriptionSource) -> Vec<String> {
        let urls = self.collect_urls(source).await;
        info!("开始拉取 {} 个订阅", urls.len());

        let texts: Vec<String> = stream::iter(urls.iter())
            .map(|url| self.fetch_one(url))
            .buffer_unordered(self.concurrency)
            .filter_map(|text| async move { text })
            .collect()
            .await;

        info!("成功拉取 {}/{} 个订阅", texts.len(), urls.len());
        texts
    }
}

/// 聚合清单：每行一个 http(s) 链接，忽略空行与注释
fn aggregator_lines(list: &str) -> Vec<String> {
    list.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter(|l| l.starts_with("http://") || l.starts_with("https://"))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregator_keeps_http_links_only() {
        let list = "https://a.example/sub\n\n# comment\nftp://b\n  http://c.example/x  \n";
        assert_eq!(
            aggregator_lines(list),
            ["https://a.example/sub", "http://c.example/x"]
        );
    }
}
