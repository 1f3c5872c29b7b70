use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::insights_model::*;
use super::insights_traits::InsightServiceTrait;
use crate::audit::{ActionAuditSink, ActionRecord, NoOpActionAuditSink};
use crate::cache::{FetchOutcome, ListCache, ListCacheConfig, RecordSource, SortOrder};
use crate::errors::{Error, Result};
use crate::events::PushBus;

struct InsightSource {
    insights: Arc<dyn InsightServiceTrait>,
}

#[async_trait]
impl RecordSource<Insight> for InsightSource {
    async fn fetch_all(&self, owner_id: &str) -> Result<Vec<Insight>> {
        self.insights.list_insights(owner_id).await
    }
}

/// Insight review page state.
pub struct InsightsService {
    insights: Arc<dyn InsightServiceTrait>,
    cache: ListCache<Insight>,
    audit_sink: Arc<dyn ActionAuditSink>,
}

impl InsightsService {
    pub fn new(insights: Arc<dyn InsightServiceTrait>, bus: Arc<dyn PushBus<Insight>>) -> Self {
        let config = ListCacheConfig::new("insights").with_sort_order(SortOrder::NewestFirst);
        let source = Arc::new(InsightSource {
            insights: Arc::clone(&insights),
        });
        Self {
            cache: ListCache::new(source, bus, config),
            insights,
            audit_sink: Arc::new(NoOpActionAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, audit_sink: Arc<dyn ActionAuditSink>) -> Self {
        self.audit_sink = audit_sink;
        self
    }

    pub fn cache(&self) -> &ListCache<Insight> {
        &self.cache
    }

    pub async fn open(&self, owner_id: Option<&str>) -> Result<FetchOutcome> {
        self.cache.bind(owner_id).await
    }

    pub fn close(&self) {
        self.cache.unbind();
    }

    pub async fn refresh(&self) -> Result<FetchOutcome> {
        self.cache.fetch_all().await
    }

    pub fn insights(&self) -> Vec<Insight> {
        self.cache.items()
    }

    /// Insights still awaiting a decision, newest first.
    pub fn pending(&self) -> Vec<Insight> {
        self.cache
            .items()
            .into_iter()
            .filter(Insight::is_pending)
            .collect()
    }

    /// Mark the insight actioned after the user triggers one of its actions.
    pub async fn take_action(&self, insight_id: &str, action: &InsightAction) -> Result<Insight> {
        let (owner_id, insight) = self
            .set_status(insight_id, InsightStatus::Actioned)
            .await?;
        self.audit(
            ACTION_INSIGHT_TAKE_ACTION,
            &owner_id,
            json!({
                "insightId": insight.id,
                "action": action.action,
                "label": action.label,
                "params": action.params,
            }),
        );
        Ok(insight)
    }

    pub async fn dismiss(&self, insight_id: &str) -> Result<Insight> {
        let (owner_id, insight) = self
            .set_status(insight_id, InsightStatus::Dismissed)
            .await?;
        self.audit(
            ACTION_INSIGHT_DISMISS,
            &owner_id,
            json!({ "insightId": insight.id }),
        );
        Ok(insight)
    }

    async fn set_status(
        &self,
        insight_id: &str,
        status: InsightStatus,
    ) -> Result<(String, Insight)> {
        let owner_id = self.cache.owner_id().ok_or(Error::NotAuthenticated)?;
        let current = self
            .cache
            .get(insight_id)
            .ok_or_else(|| Error::invalid_input(format!("insight {} not found", insight_id)))?;
        if !current.is_pending() {
            return Err(Error::invalid_input(format!(
                "insight {} is already {:?}",
                insight_id, current.status
            )));
        }

        let insights = Arc::clone(&self.insights);
        let confirmed = self
            .cache
            .apply_and_reconcile(
                insight_id,
                |current| current.map(|insight| insight.with_status(status)),
                async {
                    insights
                        .update_status(&owner_id, insight_id, status)
                        .await
                        .map(Some)
                },
            )
            .await?;
        let insight = confirmed.ok_or_else(|| {
            Error::unknown(format!("status update of {} returned no record", insight_id))
        })?;
        Ok((owner_id, insight))
    }

    fn audit(&self, kind: &str, owner_id: &str, details: Value) {
        self.audit_sink
            .record(ActionRecord::new(kind, owner_id, details));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::ChannelActionAuditSink;
    use crate::events::{InMemoryPushBus, PushEvent};
    use crate::test_support::at;
    use parking_lot::Mutex;

    fn insight(id: &str, minute: i64, status: InsightStatus) -> Insight {
        Insight {
            id: id.to_string(),
            owner_id: "u1".to_string(),
            kind: InsightKind::OptimizationRecommendation,
            details: InsightDetails {
                suggestion: format!("Suggestion {}", id),
                pattern: None,
                actions: vec![InsightAction {
                    label: "Enable Auto-Embedding".to_string(),
                    action: "update_setting".to_string(),
                    params: json!({ "setting": "auto_embed", "value": true }),
                }],
            },
            status,
            created_at: at(minute),
            updated_at: at(minute),
        }
    }

    #[derive(Default)]
    struct FakeInsights {
        insights: Mutex<Vec<Insight>>,
        fail_next: Mutex<Option<Error>>,
    }

    #[async_trait]
    impl InsightServiceTrait for FakeInsights {
        async fn list_insights(&self, owner_id: &str) -> Result<Vec<Insight>> {
            Ok(self
                .insights
                .lock()
                .iter()
                .filter(|i| i.owner_id == owner_id)
                .cloned()
                .collect())
        }

        async fn update_status(
            &self,
            _owner_id: &str,
            insight_id: &str,
            status: InsightStatus,
        ) -> Result<Insight> {
            if let Some(error) = self.fail_next.lock().take() {
                return Err(error);
            }
            let mut insights = self.insights.lock();
            let insight = insights
                .iter_mut()
                .find(|i| i.id == insight_id)
                .ok_or_else(|| Error::conflict("insight removed"))?;
            insight.status = status;
            Ok(insight.clone())
        }
    }

    async fn open_insights(
        insights: Vec<Insight>,
    ) -> (
        InsightsService,
        Arc<FakeInsights>,
        Arc<InMemoryPushBus<Insight>>,
        tokio::sync::mpsc::UnboundedReceiver<ActionRecord>,
    ) {
        let fake = Arc::new(FakeInsights::default());
        *fake.insights.lock() = insights;
        let bus = Arc::new(InMemoryPushBus::<Insight>::new());
        let (sink, audit) = ChannelActionAuditSink::channel();
        let service = InsightsService::new(fake.clone(), bus.clone()).with_audit_sink(Arc::new(sink));
        service.open(Some("u1")).await.expect("open insights");
        (service, fake, bus, audit)
    }

    fn ids(insights: Vec<Insight>) -> Vec<String> {
        insights.into_iter().map(|i| i.id).collect()
    }

    #[tokio::test]
    async fn pending_lists_only_undecided_insights() {
        let (service, _, _, _) = open_insights(vec![
            insight("i1", 1, InsightStatus::Pending),
            insight("i2", 2, InsightStatus::Actioned),
            insight("i3", 3, InsightStatus::Pending),
        ])
        .await;

        assert_eq!(ids(service.pending()), vec!["i3", "i1"]);
        assert_eq!(service.insights().len(), 3);
    }

    #[tokio::test]
    async fn take_action_marks_actioned_and_audits_action() {
        let (service, _, _, mut audit) =
            open_insights(vec![insight("i1", 1, InsightStatus::Pending)]).await;
        let action = service.insights()[0].details.actions[0].clone();

        let updated = service.take_action("i1", &action).await.expect("take action");
        assert_eq!(updated.status, InsightStatus::Actioned);
        assert!(service.pending().is_empty());

        let record = audit.try_recv().expect("audit");
        assert_eq!(record.kind, ACTION_INSIGHT_TAKE_ACTION);
        assert_eq!(record.details["action"], "update_setting");
        assert_eq!(record.details["params"]["setting"], "auto_embed");
    }

    #[tokio::test]
    async fn failed_dismiss_restores_pending() {
        let (service, fake, _, mut audit) =
            open_insights(vec![insight("i1", 1, InsightStatus::Pending)]).await;
        *fake.fail_next.lock() = Some(Error::service_unavailable("evolution engine busy"));

        assert!(service.dismiss("i1").await.is_err());
        assert_eq!(ids(service.pending()), vec!["i1"]);
        assert!(audit.try_recv().is_err());

        let dismissed = service.dismiss("i1").await.expect("dismiss");
        assert_eq!(dismissed.status, InsightStatus::Dismissed);
        assert_eq!(audit.try_recv().expect("audit").kind, ACTION_INSIGHT_DISMISS);
    }

    #[tokio::test]
    async fn decided_insights_cannot_be_decided_again() {
        let (service, _, _, _) =
            open_insights(vec![insight("i1", 1, InsightStatus::Dismissed)]).await;
        assert!(matches!(
            service.dismiss("i1").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            service.dismiss("missing").await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn pushed_insight_appears_as_pending() {
        let (service, _, bus, _) = open_insights(Vec::new()).await;
        bus.publish(PushEvent::Insert(insight("i9", 9, InsightStatus::Pending)));
        assert_eq!(ids(service.pending()), vec!["i9"]);

        service.close();
        assert!(service.insights().is_empty());
        let action = insight("i9", 9, InsightStatus::Pending).details.actions[0].clone();
        assert_eq!(
            service.take_action("i9", &action).await,
            Err(Error::NotAuthenticated)
        );
    }
}
