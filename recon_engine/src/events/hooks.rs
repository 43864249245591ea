use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    LoanRevertedEvent,
    LoanSettledEvent,
    OrderFailedEvent,
    OrderPaidEvent,
};

/// The set of producers handed to the engine APIs. Cloning is cheap; each producer is an mpsc
/// sender.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_paid_producer: Vec<EventProducer<OrderPaidEvent>>,
    pub order_failed_producer: Vec<EventProducer<OrderFailedEvent>>,
    pub loan_settled_producer: Vec<EventProducer<LoanSettledEvent>>,
    pub loan_reverted_producer: Vec<EventProducer<LoanRevertedEvent>>,
}

pub struct EventHandlers {
    pub on_order_paid: Option<EventHandler<OrderPaidEvent>>,
    pub on_order_failed: Option<EventHandler<OrderFailedEvent>>,
    pub on_loan_settled: Option<EventHandler<LoanSettledEvent>>,
    pub on_loan_reverted: Option<EventHandler<LoanRevertedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_order_paid: hooks.on_order_paid.map(|f| EventHandler::new(buffer_size, f)),
            on_order_failed: hooks.on_order_failed.map(|f| EventHandler::new(buffer_size, f)),
            on_loan_settled: hooks.on_loan_settled.map(|f| EventHandler::new(buffer_size, f)),
            on_loan_reverted: hooks.on_loan_reverted.map(|f| EventHandler::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_paid {
            result.order_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_failed {
            result.order_failed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_loan_settled {
            result.loan_settled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_loan_reverted {
            result.loan_reverted_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_paid {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_failed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_loan_settled {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_loan_reverted {
            tokio::spawn(handler.start_handler());
        }
    }
}

/// Hook registry filled in at server startup.
#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_paid: Option<Handler<OrderPaidEvent>>,
    pub on_order_failed: Option<Handler<OrderFailedEvent>>,
    pub on_loan_settled: Option<Handler<LoanSettledEvent>>,
    pub on_loan_reverted: Option<Handler<LoanRevertedEvent>>,
}

impl EventHooks {
    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderPaidEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_paid = Some(Arc::new(f));
        self
    }

    pub fn on_order_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderFailedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_failed = Some(Arc::new(f));
        self
    }

    pub fn on_loan_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(LoanSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_loan_settled = Some(Arc::new(f));
        self
    }

    pub fn on_loan_reverted<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(LoanRevertedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_loan_reverted = Some(Arc::new(f));
        self
    }
}
