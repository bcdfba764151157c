/// 订阅来源 (Config Provider)
pub trait SubscriptionSource: Send + Sync {
    /// 直接配置的订阅链接
    fn subscriptions(&self) -> Vec<String>;

    /// 聚合订阅：返回一份按行分隔的订阅链接清单
    fn aggregator(&self) -> Option<String>;
}

impl SubscriptionSource for Vec<String> {
    fn subscriptions(&self) -> Vec<String> {
        self.clone()
    }

    fn aggregator(&self) -> Option<String> {
        None
    }
}
