//! Named hook points where application handlers plug into the delivery flow.

pub mod pipeline;

pub use pipeline::{
    HandlerError, Hook, HookContext, HookEvent, HookHandle, HookPipeline, HookVerdict,
    ReceiveContext, SendContext,
};
