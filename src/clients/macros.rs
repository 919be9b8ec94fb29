/// Generate client methods with oneshot channel boilerplate and automatic tracing.
///
/// Channel failures surface as the error type's `ActorCommunication` variant;
/// everything else is the actor's own answer.
macro_rules! client_method {
    ($client:ty => fn $method:ident($($param:ident: $param_type:ty),*) -> $return_type:ty as $request:ident::$variant:ident, Error = $error_type:ty) => {
        impl $client {
            #[tracing::instrument(skip(self))]
            pub async fn $method(&self, $($param: $param_type),*) -> std::result::Result<$return_type, $error_type> {
                tracing::debug!("Sending request");
                let (respond_to, response) = tokio::sync::oneshot::channel();
                self.sender
                    .send($request::$variant {
                        $($param,)*
                        respond_to,
                    })
                    .await
                    .map_err(|_| <$error_type>::ActorCommunication("Actor closed".to_string()))?;

                response
                    .await
                    .map_err(|_| <$error_type>::ActorCommunication("Actor dropped".to_string()))?
            }
        }
    };
}

/// Generate the `new` constructor and the `shutdown` request shared by every client.
macro_rules! actor_client {
    ($client:ident, $request:ident) => {
        #[derive(Clone)]
        pub struct $client {
            sender: tokio::sync::mpsc::Sender<$request>,
        }

        impl $client {
            pub fn new(sender: tokio::sync::mpsc::Sender<$request>) -> Self {
                Self { sender }
            }

            #[tracing::instrument(skip(self))]
            pub async fn shutdown(&self) -> Result<(), String> {
                tracing::debug!("Sending shutdown request");
                self.sender
                    .send($request::Shutdown)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(())
            }
        }
    };
}

pub(crate) use actor_client;
pub(crate) use client_method;
