#[macro_export]
/// Shortcut for aborting a joinhandle and then awaiting and discarding its
/// result.
macro_rules! cancel_task {
    ($task:ident) => {
        #[allow(unused_must_use)]
        {
            let t = $task.into_inner();
            t.abort();
            t.await;
        }
    };
}

#[macro_export]
/// Implement `AsRef<FederationAgentCore>` for an agent struct that embeds a
/// `core: FederationAgentCore` field.
macro_rules! impl_as_ref_core {
    ($agent:ident) => {
        impl AsRef<$crate::agent::FederationAgentCore> for $agent {
            fn as_ref(&self) -> &$crate::agent::FederationAgentCore {
                &self.core
            }
        }
    };
}
