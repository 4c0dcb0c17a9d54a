//! `CommandGateway`: §4.7's translation of inbound commands into workflow
//! starts, signal sends, or direct escrow activities. Every method here
//! validates input, checks the caller's [`Principal`] against the job's
//! parties, then does the narrowest thing that satisfies the command —
//! a signal where the workflow owns the resulting transition, a direct
//! store/escrow call where it doesn't.

use std::sync::Arc;

use jobflow_store::JobStore;
use jobflow_types::{ActorRole, Codec, Job, JobId, JobStatus, Payload, Principal};
use jobflow_workflow::{
    self as workflow, CompletionSignal, OfferResponse, ReviewSubmittedSignal, WorkflowDeps,
    COMPLETION, JOB_STARTED, OFFER_RESPONSE, REVIEW_SUBMITTED,
};

use crate::command::*;
use crate::error::GatewayError;
use crate::runtime::WorkflowRuntime;

fn encode<T: serde::Serialize>(value: &T) -> Result<Payload, GatewayError> {
    let bytes = serde_json::to_vec(value).map_err(|e| GatewayError::InternalError(e.to_string()))?;
    Ok(Payload::new(bytes, Codec::Json))
}

fn require_role(principal: &Principal, role: ActorRole) -> Result<(), GatewayError> {
    if principal.role == role {
        Ok(())
    } else {
        Err(GatewayError::Forbidden(format!("requires role {role:?}, caller is {:?}", principal.role)))
    }
}

fn require_party(principal: &Principal, job: &Job) -> Result<(), GatewayError> {
    let is_consumer = principal.role == ActorRole::Consumer && principal.user_id == job.consumer_id;
    let is_worker = principal.role == ActorRole::Worker && Some(principal.user_id) == job.worker_id;
    if is_consumer || is_worker {
        Ok(())
    } else {
        Err(GatewayError::Forbidden(format!("caller is not a party to job {}", job.id)))
    }
}

fn require_status(job: &Job, expected: JobStatus) -> Result<(), GatewayError> {
    if job.status == expected {
        Ok(())
    } else {
        Err(GatewayError::Conflict(format!(
            "job {} is {:?}, expected {expected:?}",
            job.id, job.status
        )))
    }
}

pub struct CommandGateway {
    store: Arc<dyn JobStore>,
    deps: Arc<WorkflowDeps>,
    runtime: Arc<dyn WorkflowRuntime>,
}

impl CommandGateway {
    pub fn new(store: Arc<dyn JobStore>, deps: Arc<WorkflowDeps>, runtime: Arc<dyn WorkflowRuntime>) -> Self {
        Self { store, deps, runtime }
    }

    #[tracing::instrument(skip(self, command))]
    pub async fn create_job(&self, command: CreateJobCommand) -> Result<CreateJobResult, GatewayError> {
        require_role(&command.principal, ActorRole::Consumer)?;
        if command.title.trim().is_empty() {
            return Err(GatewayError::InvalidInput("title must not be empty".into()));
        }
        if let (Some(start), Some(end)) = (command.scheduled_start, command.scheduled_end) {
            if end <= start {
                return Err(GatewayError::InvalidInput("scheduled_end must be after scheduled_start".into()));
            }
        }

        let job = self
            .store
            .create_job(jobflow_store::NewJob {
                consumer_id: command.principal.user_id,
                title: command.title,
                description: command.description,
                category: command.category,
                address: command.address,
                location: command.location,
                pay_spec: command.pay_spec,
                scheduled_start: command.scheduled_start,
                scheduled_end: command.scheduled_end,
            })
            .await?;

        self.runtime.start_lifecycle(job.id).await?;

        Ok(CreateJobResult { job_id: job.id, status: job.status })
    }

    #[tracing::instrument(skip(self))]
    pub async fn accept_offer(&self, command: AcceptOfferCommand) -> Result<Ack, GatewayError> {
        let job = self.store.get_job(command.job_id).await?;
        require_role(&command.principal, ActorRole::Consumer)?;
        require_party(&command.principal, &job)?;
        require_status(&job, JobStatus::OfferSent)?;

        self.runtime
            .signal(job.id, OFFER_RESPONSE, encode(&OfferResponse::Accepted)?)
            .await?;
        Ok(Ack { job_id: job.id })
    }

    #[tracing::instrument(skip(self))]
    pub async fn reject_offer(&self, command: RejectOfferCommand) -> Result<Ack, GatewayError> {
        let job = self.store.get_job(command.job_id).await?;
        require_role(&command.principal, ActorRole::Consumer)?;
        require_party(&command.principal, &job)?;
        require_status(&job, JobStatus::OfferSent)?;

        self.runtime
            .signal(job.id, OFFER_RESPONSE, encode(&OfferResponse::Rejected)?)
            .await?;
        Ok(Ack { job_id: job.id })
    }

    #[tracing::instrument(skip(self))]
    pub async fn start_job(&self, command: StartJobCommand) -> Result<Ack, GatewayError> {
        let job = self.store.get_job(command.job_id).await?;
        require_role(&command.principal, ActorRole::Worker)?;
        require_party(&command.principal, &job)?;
        require_status(&job, JobStatus::Scheduled)?;

        self.runtime.signal(job.id, JOB_STARTED, encode(&())?).await?;
        Ok(Ack { job_id: job.id })
    }

    /// Dual-write per §4.3: `record_completion` lands synchronously so the
    /// caller gets an authoritative `{worker_confirmed, consumer_confirmed,
    /// fully_completed}` without waiting on the workflow, and the signal is
    /// still sent so the workflow's own (idempotent) wait resolves and it
    /// can drive the `completed -> paid` activities once both sides are in.
    #[tracing::instrument(skip(self))]
    pub async fn complete_job(&self, command: CompleteJobCommand) -> Result<CompleteJobResult, GatewayError> {
        let job = self.store.get_job(command.job_id).await?;
        require_party(&command.principal, &job)?;
        if !matches!(job.status, JobStatus::InProgress | JobStatus::Completed) {
            return Err(GatewayError::Conflict(format!("job {} is {:?}, not in progress", job.id, job.status)));
        }

        let role = command.principal.role;
        let now = chrono::Utc::now();
        let dual = self.store.record_completion(job.id, role, now).await?;

        self.runtime
            .signal(job.id, COMPLETION, encode(&CompletionSignal { role })?)
            .await?;

        let refreshed = self.store.get_job(job.id).await?;
        Ok(CompleteJobResult {
            worker_confirmed: refreshed.worker_completed_at.is_some(),
            consumer_confirmed: refreshed.consumer_completed_at.is_some(),
            fully_completed: dual.both_confirmed,
        })
    }

    #[tracing::instrument(skip(self, command))]
    pub async fn submit_review(&self, command: SubmitReviewCommand) -> Result<Ack, GatewayError> {
        let job = self.store.get_job(command.job_id).await?;
        require_party(&command.principal, &job)?;
        if !(1..=5).contains(&command.rating) {
            return Err(GatewayError::InvalidInput("rating must be between 1 and 5".into()));
        }
        if !matches!(job.status, JobStatus::Paid | JobStatus::ReviewPending) {
            return Err(GatewayError::Conflict(format!("job {} is not accepting reviews in status {:?}", job.id, job.status)));
        }

        self.runtime
            .signal(
                job.id,
                REVIEW_SUBMITTED,
                encode(&ReviewSubmittedSignal {
                    reviewer: command.principal.user_id,
                    rating: command.rating,
                    text: command.text,
                    is_public: command.is_public,
                })?,
            )
            .await?;
        Ok(Ack { job_id: job.id })
    }

    /// Invokes `escrow::authorize_payment` directly — §4.6's note that the
    /// escrow sub-protocol is Command-Gateway-invoked, not workflow-owned.
    #[tracing::instrument(skip(self, command))]
    pub async fn authorize_payment(
        &self,
        command: AuthorizePaymentCommand,
    ) -> Result<AuthorizePaymentResult, GatewayError> {
        let job = self.store.get_job(command.job_id).await?;
        require_role(&command.principal, ActorRole::Consumer)?;
        require_party(&command.principal, &job)?;
        if command.amount <= rust_decimal::Decimal::ZERO {
            return Err(GatewayError::InvalidInput("amount must be positive".into()));
        }

        let idempotency_key = format!("authorize:{}", command.job_id);
        let transaction = workflow::authorize_payment(&self.deps, command.job_id, command.source_token, idempotency_key)
            .await?;

        if command.accept_offer && job.status == JobStatus::OfferSent {
            self.runtime
                .signal(job.id, OFFER_RESPONSE, encode(&OfferResponse::Accepted)?)
                .await?;
        }

        Ok(AuthorizePaymentResult { transaction })
    }

    #[tracing::instrument(skip(self, command))]
    pub async fn capture_payment(&self, command: CapturePaymentCommand) -> Result<CapturePaymentResult, GatewayError> {
        if !matches!(command.principal.role, ActorRole::Consumer | ActorRole::Worker) {
            return Err(GatewayError::Forbidden("capture requires a consumer or worker principal".into()));
        }
        let authorization = self.store.get_transaction(command.transaction_id).await?;
        let job = self.store.get_job(authorization.job_id).await?;
        require_party(&command.principal, &job)?;

        if let Some(requested) = command.amount {
            if requested != authorization.amount {
                return Err(GatewayError::InvalidInput(format!(
                    "partial capture is not supported; amount must equal the authorized total {}",
                    authorization.amount
                )));
            }
        }

        let idempotency_key = format!("capture:{}", command.transaction_id);
        let transaction = workflow::capture_payment(&self.deps, job.id, idempotency_key).await?;
        Ok(CapturePaymentResult { transaction })
    }

    #[tracing::instrument(skip(self, command))]
    pub async fn refund_payment(&self, command: RefundPaymentCommand) -> Result<RefundPaymentResult, GatewayError> {
        if !matches!(command.principal.role, ActorRole::Consumer | ActorRole::Admin) {
            return Err(GatewayError::Forbidden("refund requires a consumer or admin principal".into()));
        }
        let capture = self.store.get_transaction(command.transaction_id).await?;
        let job = self.store.get_job(capture.job_id).await?;
        if command.principal.role == ActorRole::Consumer {
            require_party(&command.principal, &job)?;
        }
        if command.reason.trim().is_empty() {
            return Err(GatewayError::InvalidInput("reason must not be empty".into()));
        }

        let idempotency_key = format!("refund:{}:{}", command.transaction_id, command.amount.unwrap_or_default());
        let transaction = workflow::refund_payment(&self.deps, job.id, command.amount, idempotency_key).await?;
        Ok(RefundPaymentResult { transaction })
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_payment_summary(
        &self,
        command: GetPaymentSummaryCommand,
    ) -> Result<jobflow_types::PaymentSummary, GatewayError> {
        let job = self.store.get_job(command.job_id).await?;
        require_party(&command.principal, &job)?;
        Ok(self.store.get_payment_summary(job.id).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use jobflow_payments::FakeProcessor;
    use jobflow_store::InMemoryJobStore;
    use jobflow_types::{GeoLocation, PaySpec, UserId};
    use jobflow_workflow::{NullMatcher, WorkflowConfig};
    use rust_decimal_macros::dec;

    use super::*;

    /// Records every start/signal call instead of actually running a
    /// scheduler, so these tests exercise the gateway's own validation and
    /// dispatch logic without standing up `jobflow-engine`.
    #[derive(Default)]
    struct RecordingRuntime {
        started: Mutex<Vec<JobId>>,
        signals: Mutex<Vec<(JobId, String, Payload)>>,
    }

    #[async_trait]
    impl WorkflowRuntime for RecordingRuntime {
        async fn start_lifecycle(&self, job_id: JobId) -> Result<(), GatewayError> {
            self.started.lock().unwrap().push(job_id);
            Ok(())
        }

        async fn signal(&self, job_id: JobId, name: &str, payload: Payload) -> Result<(), GatewayError> {
            self.signals.lock().unwrap().push((job_id, name.to_string(), payload));
            Ok(())
        }
    }

    struct Fixture {
        gateway: CommandGateway,
        store: Arc<dyn JobStore>,
        runtime: Arc<RecordingRuntime>,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let deps = Arc::new(WorkflowDeps {
            store: store.clone(),
            payments: Arc::new(FakeProcessor::new()),
            matcher: Arc::new(NullMatcher),
            config: WorkflowConfig::default(),
        });
        let runtime = Arc::new(RecordingRuntime::default());
        let gateway = CommandGateway::new(store.clone(), deps, runtime.clone());
        Fixture { gateway, store, runtime }
    }

    fn consumer(user_id: UserId) -> Principal {
        Principal { user_id, role: ActorRole::Consumer }
    }

    fn worker(user_id: UserId) -> Principal {
        Principal { user_id, role: ActorRole::Worker }
    }

    async fn create_job(f: &Fixture, consumer_id: UserId) -> JobId {
        let result = f
            .gateway
            .create_job(CreateJobCommand {
                principal: consumer(consumer_id),
                title: "Mow the lawn".into(),
                description: "Front and back".into(),
                category: "yard".into(),
                address: "123 Main St".into(),
                location: Some(GeoLocation { latitude: 30.0, longitude: -97.0 }),
                pay_spec: PaySpec::Total(dec!(100.00)),
                scheduled_start: None,
                scheduled_end: None,
            })
            .await
            .unwrap();
        result.job_id
    }

    #[tokio::test]
    async fn create_job_starts_the_lifecycle_and_returns_posted() {
        let f = fixture();
        let consumer_id = UserId::new();
        let job_id = create_job(&f, consumer_id).await;

        assert_eq!(f.store.get_job(job_id).await.unwrap().status, JobStatus::Posted);
        assert_eq!(f.runtime.started.lock().unwrap().as_slice(), [job_id]);
    }

    #[tokio::test]
    async fn create_job_rejects_a_worker_principal() {
        let f = fixture();
        let result = f
            .gateway
            .create_job(CreateJobCommand {
                principal: worker(UserId::new()),
                title: "Mow the lawn".into(),
                description: "Front and back".into(),
                category: "yard".into(),
                address: "123 Main St".into(),
                location: None,
                pay_spec: PaySpec::Total(dec!(100.00)),
                scheduled_start: None,
                scheduled_end: None,
            })
            .await;
        assert!(matches!(result, Err(GatewayError::Forbidden(_))));
    }

    #[tokio::test]
    async fn accept_offer_signals_only_in_offer_sent() {
        let f = fixture();
        let consumer_id = UserId::new();
        let job_id = create_job(&f, consumer_id).await;

        let too_early = f
            .gateway
            .accept_offer(AcceptOfferCommand { principal: consumer(consumer_id), job_id })
            .await;
        assert!(matches!(too_early, Err(GatewayError::Conflict(_))));

        f.store
            .update_status(job_id, JobStatus::Posted, JobStatus::OfferSent, jobflow_store::JobFieldUpdate::default())
            .await
            .unwrap();

        f.gateway
            .accept_offer(AcceptOfferCommand { principal: consumer(consumer_id), job_id })
            .await
            .unwrap();

        // The gateway never mutates status for this command; the signal is
        // the only observable effect, and the workflow owns the transition.
        assert_eq!(f.store.get_job(job_id).await.unwrap().status, JobStatus::OfferSent);
        let signals = f.runtime.signals.lock().unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].1, OFFER_RESPONSE);
    }

    #[tokio::test]
    async fn accept_offer_rejects_a_non_owning_consumer() {
        let f = fixture();
        let consumer_id = UserId::new();
        let job_id = create_job(&f, consumer_id).await;
        f.store
            .update_status(job_id, JobStatus::Posted, JobStatus::OfferSent, jobflow_store::JobFieldUpdate::default())
            .await
            .unwrap();

        let result = f
            .gateway
            .accept_offer(AcceptOfferCommand { principal: consumer(UserId::new()), job_id })
            .await;
        assert!(matches!(result, Err(GatewayError::Forbidden(_))));
    }

    #[tokio::test]
    async fn complete_job_dual_writes_and_reports_fully_completed_only_once_both_sides_confirm() {
        let f = fixture();
        let consumer_id = UserId::new();
        let worker_id = UserId::new();
        let job_id = create_job(&f, consumer_id).await;
        f.store
            .update_status(job_id, JobStatus::Posted, JobStatus::OfferSent, jobflow_store::JobFieldUpdate::default())
            .await
            .unwrap();
        f.store
            .update_status(job_id, JobStatus::OfferSent, JobStatus::Accepted, jobflow_store::JobFieldUpdate::default())
            .await
            .unwrap();
        f.store.assign_worker(job_id, worker_id).await.unwrap();
        f.store
            .update_status(job_id, JobStatus::WorkerAssigned, JobStatus::Scheduled, jobflow_store::JobFieldUpdate::default())
            .await
            .unwrap();
        f.store
            .update_status(job_id, JobStatus::Scheduled, JobStatus::InProgress, jobflow_store::JobFieldUpdate::default())
            .await
            .unwrap();

        let first = f
            .gateway
            .complete_job(CompleteJobCommand { principal: worker(worker_id), job_id })
            .await
            .unwrap();
        assert!(first.worker_confirmed);
        assert!(!first.consumer_confirmed);
        assert!(!first.fully_completed);

        let second = f
            .gateway
            .complete_job(CompleteJobCommand { principal: consumer(consumer_id), job_id })
            .await
            .unwrap();
        assert!(second.worker_confirmed);
        assert!(second.consumer_confirmed);
        assert!(second.fully_completed);

        assert_eq!(f.runtime.signals.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn submit_review_rejects_an_out_of_range_rating() {
        let f = fixture();
        let consumer_id = UserId::new();
        let job_id = create_job(&f, consumer_id).await;
        f.store
            .update_status(job_id, JobStatus::Posted, JobStatus::OfferSent, jobflow_store::JobFieldUpdate::default())
            .await
            .unwrap();
        f.store
            .update_status(job_id, JobStatus::OfferSent, JobStatus::Accepted, jobflow_store::JobFieldUpdate::default())
            .await
            .unwrap();
        let worker_id = UserId::new();
        f.store.assign_worker(job_id, worker_id).await.unwrap();
        f.store
            .update_status(job_id, JobStatus::WorkerAssigned, JobStatus::Scheduled, jobflow_store::JobFieldUpdate::default())
            .await
            .unwrap();
        f.store
            .update_status(job_id, JobStatus::Scheduled, JobStatus::InProgress, jobflow_store::JobFieldUpdate::default())
            .await
            .unwrap();
        f.store
            .update_status(job_id, JobStatus::InProgress, JobStatus::Completed, jobflow_store::JobFieldUpdate::default())
            .await
            .unwrap();
        f.store
            .update_status(job_id, JobStatus::Completed, JobStatus::Paid, jobflow_store::JobFieldUpdate::default())
            .await
            .unwrap();

        let result = f
            .gateway
            .submit_review(SubmitReviewCommand {
                principal: consumer(consumer_id),
                job_id,
                rating: 9,
                text: "great job".into(),
                is_public: true,
            })
            .await;
        assert!(matches!(result, Err(GatewayError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn authorize_payment_with_accept_offer_also_signals_offer_response() {
        let f = fixture();
        let consumer_id = UserId::new();
        let job_id = create_job(&f, consumer_id).await;
        f.store
            .update_status(job_id, JobStatus::Posted, JobStatus::OfferSent, jobflow_store::JobFieldUpdate::default())
            .await
            .unwrap();

        let result = f
            .gateway
            .authorize_payment(AuthorizePaymentCommand {
                principal: consumer(consumer_id),
                job_id,
                amount: dec!(100.00),
                source_token: "tok_1".into(),
                accept_offer: true,
            })
            .await
            .unwrap();

        assert_eq!(result.transaction.amount, dec!(100.00));
        let signals = f.runtime.signals.lock().unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].1, OFFER_RESPONSE);
    }

    #[tokio::test]
    async fn capture_payment_rejects_a_mismatched_partial_amount() {
        let f = fixture();
        let consumer_id = UserId::new();
        let job_id = create_job(&f, consumer_id).await;
        let authorization = f
            .gateway
            .authorize_payment(AuthorizePaymentCommand {
                principal: consumer(consumer_id),
                job_id,
                amount: dec!(100.00),
                source_token: "tok_1".into(),
                accept_offer: false,
            })
            .await
            .unwrap();

        let result = f
            .gateway
            .capture_payment(CapturePaymentCommand {
                principal: consumer(consumer_id),
                transaction_id: authorization.transaction.id,
                amount: Some(dec!(50.00)),
            })
            .await;
        assert!(matches!(result, Err(GatewayError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn get_payment_summary_is_visible_to_either_party() {
        let f = fixture();
        let consumer_id = UserId::new();
        let job_id = create_job(&f, consumer_id).await;
        f.gateway
            .authorize_payment(AuthorizePaymentCommand {
                principal: consumer(consumer_id),
                job_id,
                amount: dec!(100.00),
                source_token: "tok_1".into(),
                accept_offer: false,
            })
            .await
            .unwrap();

        let summary = f
            .gateway
            .get_payment_summary(GetPaymentSummaryCommand { principal: consumer(consumer_id), job_id })
            .await
            .unwrap();
        assert_eq!(summary.authorized_total, dec!(100.00));
    }
}
