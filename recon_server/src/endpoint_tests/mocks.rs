use mockall::mock;
use recon_engine::{
    db_types::{
        CallbackDeadLetter,
        CallbackJob,
        DeliveryAttempt,
        LoanEntry,
        NewCallbackJob,
        NewOrder,
        Order,
        OrderId,
        OrderStatus,
        PartnerClient,
    },
    traits::{
        CallbackQueue,
        LoanItemOutcome,
        OrderRangeQuery,
        PaidOrderUpdate,
        PreparedLoanRevert,
        PreparedLoanSettlement,
        ReconBackend,
        ReconBackendError,
    },
};

mock! {
    pub Backend {}

    impl Clone for Backend {
        fn clone(&self) -> Self;
    }

    impl ReconBackend for Backend {
        fn url(&self) -> &str;
        async fn insert_order(&self, order: NewOrder) -> Result<bool, ReconBackendError>;
        async fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, ReconBackendError>;
        async fn fetch_partner(&self, partner_client_id: &str) -> Result<Option<PartnerClient>, ReconBackendError>;
        async fn settle_order_paid(
            &self,
            id: &OrderId,
            update: PaidOrderUpdate,
            callback: Option<NewCallbackJob>,
        ) -> Result<Option<Order>, ReconBackendError>;
        async fn fail_order(
            &self,
            id: &OrderId,
            new_status: OrderStatus,
            provider_payload: Option<String>,
        ) -> Result<Option<Order>, ReconBackendError>;
        async fn fetch_orders_page(&self, query: &OrderRangeQuery) -> Result<Vec<Order>, ReconBackendError>;
        async fn fetch_loan_entry(&self, order_id: &OrderId) -> Result<Option<LoanEntry>, ReconBackendError>;
        async fn apply_loan_settlements(
            &self,
            items: &[PreparedLoanSettlement],
        ) -> Result<Vec<LoanItemOutcome>, ReconBackendError>;
        async fn apply_loan_reverts(
            &self,
            items: &[PreparedLoanRevert],
        ) -> Result<Vec<LoanItemOutcome>, ReconBackendError>;
    }

    impl CallbackQueue for Backend {
        async fn enqueue_callback(&self, job: NewCallbackJob) -> Result<CallbackJob, ReconBackendError>;
        async fn callback_recorded(&self, order_id: &OrderId) -> Result<bool, ReconBackendError>;
        async fn fetch_due_callbacks(&self, limit: u32, max_attempts: i64) -> Result<Vec<CallbackJob>, ReconBackendError>;
        async fn record_callback_attempt(
            &self,
            job_id: i64,
            attempt: DeliveryAttempt,
        ) -> Result<CallbackJob, ReconBackendError>;
        async fn dead_letter_callback(&self, job_id: i64) -> Result<CallbackDeadLetter, ReconBackendError>;
        async fn fetch_dead_letters(&self, limit: u32) -> Result<Vec<CallbackDeadLetter>, ReconBackendError>;
    }
}
