mod callbacks;
mod helpers;
mod loans;
mod mocks;
mod webhooks;
