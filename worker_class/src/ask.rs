use log::debug;
use ractor::{ActorRef, RpcReplyPort, async_trait, concurrency::Duration, rpc::CallResult};

use crate::error::CallError;

// -------------------------------------------------------------------------------------------------------

/// Request/reply against an actor, with the failure modes folded into `CallError`.
#[async_trait]
pub(crate) trait AskExt<TMessage: ractor::Message + 'static> {
    async fn ask<TReply: Send + 'static, TMsgBuilder>(
        &self,
        msg_builder: TMsgBuilder,
        timeout_option: Option<Duration>,
    ) -> Result<TReply, CallError>
    where
        TMsgBuilder: FnOnce(RpcReplyPort<TReply>) -> TMessage + Send;
}

#[async_trait]
impl<TMessage: ractor::Message + 'static> AskExt<TMessage> for ActorRef<TMessage> {
    async fn ask<TReply: Send + 'static, TMsgBuilder>(
        &self,
        msg_builder: TMsgBuilder,
        timeout_option: Option<Duration>,
    ) -> Result<TReply, CallError>
    where
        TMsgBuilder: FnOnce(RpcReplyPort<TReply>) -> TMessage + Send,
    {
        // a stopped actor refuses the message; a stopping one drops the reply port
        let call_result = self.call(msg_builder, timeout_option).await.map_err(|err| {
            debug!("ask: actor {} refused the message: {}", self.get_id(), err);
            CallError::ChannelClosed
        })?;

        match call_result {
            CallResult::Success(result) => Ok(result),
            CallResult::Timeout => Err(CallError::Timeout(timeout_option.unwrap_or_default())),
            CallResult::SenderError => Err(CallError::ChannelClosed),
        }
    }
}
