//! Runs plugin hooks around the signature step.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use super::PipelineError;
use super::run::{HookStage, PipelineState, SigningRun};
use super::signer::{Signer, SigningRequest};
use crate::plugins::{Certificate, PluginFailure, PluginHandle, PluginRegistry, SignatureFormat};
use crate::provider::SignatureProviderBootstrap;

/// Final result of a completed signing operation.
#[derive(Debug, Clone)]
pub struct SignedDocument {
    pub signature: Vec<u8>,
    pub cert_chain: Vec<Certificate>,
    pub run: SigningRun,
}

/// Ordered, fail-fast execution of installed plugins' signing hooks.
///
/// Each hook receives the previous hook's output. The first failure aborts
/// the stage and no later plugin runs.
pub struct HookPipeline {
    registry: Arc<PluginRegistry>,
    bootstrap: Arc<SignatureProviderBootstrap>,
    hook_timeout: Option<Duration>,
}

impl HookPipeline {
    pub fn new(registry: Arc<PluginRegistry>, bootstrap: Arc<SignatureProviderBootstrap>) -> Self {
        Self {
            registry,
            bootstrap,
            hook_timeout: None,
        }
    }

    /// Aborts the stage when a single hook runs longer than `timeout`.
    pub fn with_hook_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.hook_timeout = timeout;
        self
    }

    pub fn hook_timeout(&self) -> Option<Duration> {
        self.hook_timeout
    }

    pub async fn run_pre_sign(
        &self,
        data: Vec<u8>,
        format: &SignatureFormat,
    ) -> Result<Vec<u8>, PipelineError> {
        let plugins = self.registry.installed().await?;
        self.pre_sign_with(&plugins, data, format).await
    }

    pub async fn run_post_sign(
        &self,
        signature: Vec<u8>,
        format: &SignatureFormat,
        cert_chain: &[Certificate],
    ) -> Result<Vec<u8>, PipelineError> {
        let plugins = self.registry.installed().await?;
        self.post_sign_with(&plugins, signature, format, cert_chain)
            .await
    }

    /// Runs one whole signing operation against a single snapshot of the
    /// installed plugins, then resets every plugin whatever the outcome.
    ///
    /// The signer is never called when pre-processing aborts.
    pub async fn sign(
        &self,
        request: SigningRequest,
        signer: &dyn Signer,
    ) -> Result<SignedDocument, PipelineError> {
        let mut run = SigningRun::new();
        self.sign_run(&mut run, request, signer).await
    }

    /// Same as [`sign`](Self::sign), recording transitions into `run` so an
    /// aborted operation can still be inspected. A `run` that is not idle is
    /// replaced with a fresh one first.
    pub async fn sign_run(
        &self,
        run: &mut SigningRun,
        request: SigningRequest,
        signer: &dyn Signer,
    ) -> Result<SignedDocument, PipelineError> {
        if run.state() != PipelineState::Idle {
            *run = SigningRun::new();
        }
        let plugins = self.registry.installed().await?;

        let result = self.drive(&plugins, request, signer, run).await;
        if result.is_err() {
            run.advance(PipelineState::Aborted);
        }

        for plugin in &plugins {
            self.reset(plugin).await;
        }

        match result {
            Ok((signature, cert_chain)) => {
                tracing::info!(run = %run.id(), plugins = plugins.len(), "Signing completed");
                Ok(SignedDocument {
                    signature,
                    cert_chain,
                    run: run.clone(),
                })
            }
            Err(e) => {
                tracing::warn!(run = %run.id(), error = %e, "Signing aborted");
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        plugins: &[PluginHandle],
        request: SigningRequest,
        signer: &dyn Signer,
        run: &mut SigningRun,
    ) -> Result<(Vec<u8>, Vec<Certificate>), PipelineError> {
        let SigningRequest { data, format } = request;

        run.advance(PipelineState::PreProcessing);
        let data = self.pre_sign_with(plugins, data, &format).await?;

        run.advance(PipelineState::Signing);
        self.bootstrap.configure().await;
        let output = signer.sign(&data, &format).await?;

        run.advance(PipelineState::PostProcessing);
        let signature = self
            .post_sign_with(plugins, output.signature, &format, &output.cert_chain)
            .await?;

        run.advance(PipelineState::Done);
        Ok((signature, output.cert_chain))
    }

    async fn pre_sign_with(
        &self,
        plugins: &[PluginHandle],
        mut data: Vec<u8>,
        format: &SignatureFormat,
    ) -> Result<Vec<u8>, PipelineError> {
        for plugin in plugins {
            data = self
                .guard(HookStage::PreSign, plugin, plugin.pre_sign(data, format))
                .await?;
        }
        Ok(data)
    }

    async fn post_sign_with(
        &self,
        plugins: &[PluginHandle],
        mut signature: Vec<u8>,
        format: &SignatureFormat,
        cert_chain: &[Certificate],
    ) -> Result<Vec<u8>, PipelineError> {
        for plugin in plugins {
            signature = self
                .guard(
                    HookStage::PostSign,
                    plugin,
                    plugin.post_sign(signature, format, cert_chain),
                )
                .await?;
        }
        Ok(signature)
    }

    async fn guard<F>(
        &self,
        stage: HookStage,
        plugin: &PluginHandle,
        hook: F,
    ) -> Result<Vec<u8>, PipelineError>
    where
        F: Future<Output = Result<Vec<u8>, PluginFailure>>,
    {
        tracing::debug!(plugin = %plugin.identity(), stage = %stage, "Running plugin hook");

        let result = match self.hook_timeout {
            Some(limit) => match timeout(limit, hook).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        plugin = %plugin.identity(),
                        stage = %stage,
                        timeout_ms = limit.as_millis() as u64,
                        "Plugin hook timed out"
                    );
                    return Err(PipelineError::HookTimeout {
                        stage,
                        plugin: plugin.identity(),
                        timeout: limit,
                    });
                }
            },
            None => hook.await,
        };

        result.map_err(|source| {
            tracing::warn!(
                plugin = %plugin.identity(),
                stage = %stage,
                error = %source,
                "Plugin hook failed"
            );
            PipelineError::Aborted {
                stage,
                plugin: plugin.identity(),
                source,
            }
        })
    }

    async fn reset(&self, plugin: &PluginHandle) {
        match self.hook_timeout {
            Some(limit) => {
                if timeout(limit, plugin.reset()).await.is_err() {
                    tracing::warn!(plugin = %plugin.identity(), "Plugin reset timed out");
                }
            }
            None => plugin.reset().await,
        }
    }
}

impl std::fmt::Debug for HookPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookPipeline")
            .field("registry", &self.registry)
            .field("hook_timeout", &self.hook_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryProperties;
    use crate::pipeline::{SignerError, SignerOutput};
    use crate::plugins::{BundleManifest, InstallLayout, Plugin, PluginDescriptor, PluginLoader};
    use crate::provider::{
        ImplementationCatalog, InMemoryProviderTable, SIGNATURE_MECHANISM, SecurityProvider,
    };
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{TempDir, tempdir};

    type Journal = Arc<Mutex<Vec<String>>>;

    enum Behavior {
        Append(&'static str),
        Fail(&'static str),
        Hang,
    }

    struct Scripted {
        descriptor: PluginDescriptor,
        pre: Behavior,
        post: Behavior,
        journal: Journal,
    }

    impl Scripted {
        async fn apply(
            &self,
            hook: &str,
            mut bytes: Vec<u8>,
            behavior: &Behavior,
        ) -> Result<Vec<u8>, PluginFailure> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}:{hook}", self.descriptor.internal_name()));
            match behavior {
                Behavior::Append(suffix) => {
                    bytes.extend_from_slice(suffix.as_bytes());
                    Ok(bytes)
                }
                Behavior::Fail(message) => Err(PluginFailure::new(*message)),
                Behavior::Hang => std::future::pending().await,
            }
        }
    }

    #[async_trait]
    impl Plugin for Scripted {
        fn descriptor(&self) -> &PluginDescriptor {
            &self.descriptor
        }

        async fn pre_sign(
            &self,
            data: Vec<u8>,
            _format: &SignatureFormat,
        ) -> Result<Vec<u8>, PluginFailure> {
            self.apply("pre", data, &self.pre).await
        }

        async fn post_sign(
            &self,
            signature: Vec<u8>,
            _format: &SignatureFormat,
            cert_chain: &[Certificate],
        ) -> Result<Vec<u8>, PluginFailure> {
            assert_eq!(cert_chain.len(), 1);
            self.apply("post", signature, &self.post).await
        }

        async fn reset(&self) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}:reset", self.descriptor.internal_name()));
        }
    }

    struct EchoSigner {
        calls: AtomicUsize,
        fail: bool,
    }

    impl EchoSigner {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl Signer for EchoSigner {
        async fn sign(
            &self,
            data: &[u8],
            _format: &SignatureFormat,
        ) -> Result<SignerOutput, SignerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SignerError::new("token removed"));
            }
            let mut signature = b"SIG(".to_vec();
            signature.extend_from_slice(data);
            signature.push(b')');
            Ok(SignerOutput {
                signature,
                cert_chain: vec![Certificate::from_der(vec![0x30, 0x82])],
            })
        }
    }

    struct Fixture {
        _dir: TempDir,
        journal: Journal,
        registry: Arc<PluginRegistry>,
        bootstrap: Arc<SignatureProviderBootstrap>,
    }

    impl Fixture {
        /// Installs one plugin per `(name, pre, post)` in order.
        async fn new(plugins: Vec<(&'static str, Behavior, Behavior)>) -> Self {
            let dir = tempdir().unwrap();
            let journal: Journal = Arc::new(Mutex::new(Vec::new()));
            let loader = PluginLoader::new();
            let mut bundles = Vec::new();

            let mut behaviors = std::collections::HashMap::new();
            for (name, pre, post) in plugins {
                behaviors.insert(name.to_string(), (pre, post));
                bundles.push(write_bundle(dir.path(), name));
            }
            let behaviors = Arc::new(Mutex::new(behaviors));
            {
                let journal = Arc::clone(&journal);
                loader.register("test.Scripted", move |descriptor: PluginDescriptor| {
                    let (pre, post) = behaviors
                        .lock()
                        .unwrap()
                        .remove(descriptor.internal_name())
                        .unwrap_or((Behavior::Append(""), Behavior::Append("")));
                    Arc::new(Scripted {
                        descriptor,
                        pre,
                        post,
                        journal: Arc::clone(&journal),
                    }) as Arc<dyn Plugin>
                });
            }

            let registry = Arc::new(PluginRegistry::new(
                InstallLayout::new(dir.path().join("installed")),
                Arc::new(loader),
            ));
            for bundle in &bundles {
                let handle = registry.validate(bundle).await.unwrap();
                registry.install(bundle, handle).await.unwrap();
            }

            let table = InMemoryProviderTable::with_providers(vec![
                SecurityProvider::new("XMLDSig", "host.XMLDSig")
                    .with_mechanism(SIGNATURE_MECHANISM),
            ]);
            let bootstrap = Arc::new(SignatureProviderBootstrap::new(
                Arc::new(table),
                Arc::new(MemoryProperties::new()),
                ImplementationCatalog::new(),
            ));

            Self {
                _dir: dir,
                journal,
                registry,
                bootstrap,
            }
        }

        fn pipeline(&self) -> HookPipeline {
            HookPipeline::new(Arc::clone(&self.registry), Arc::clone(&self.bootstrap))
        }

        fn journal(&self) -> Vec<String> {
            self.journal.lock().unwrap().clone()
        }
    }

    fn write_bundle(dir: &Path, name: &str) -> std::path::PathBuf {
        let path = dir.join(format!("{name}.sigplugin"));
        let manifest = BundleManifest::new(PluginDescriptor::new(name, 1, "1.0"), "test.Scripted");
        std::fs::write(&path, serde_json::to_vec(&manifest).unwrap()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_no_plugins_is_identity() {
        let fx = Fixture::new(vec![]).await;
        let pipeline = fx.pipeline();
        let out = pipeline
            .run_pre_sign(b"doc".to_vec(), &SignatureFormat::XAdES)
            .await
            .unwrap();
        assert_eq!(out, b"doc");
    }

    #[tokio::test]
    async fn test_pre_sign_chains_in_order() {
        let fx = Fixture::new(vec![
            ("a", Behavior::Append("+a"), Behavior::Append("")),
            ("b", Behavior::Append("+b"), Behavior::Append("")),
        ])
        .await;
        let out = fx
            .pipeline()
            .run_pre_sign(b"doc".to_vec(), &SignatureFormat::XAdES)
            .await
            .unwrap();
        assert_eq!(out, b"doc+a+b");
        assert_eq!(fx.journal(), ["a:pre", "b:pre"]);
    }

    #[tokio::test]
    async fn test_pre_sign_fails_fast() {
        let fx = Fixture::new(vec![
            ("a", Behavior::Append("+a"), Behavior::Append("")),
            ("b", Behavior::Fail("Document rejected by b"), Behavior::Append("")),
            ("c", Behavior::Append("+c"), Behavior::Append("")),
        ])
        .await;
        let err = fx
            .pipeline()
            .run_pre_sign(b"doc".to_vec(), &SignatureFormat::XAdES)
            .await
            .unwrap_err();

        match &err {
            PipelineError::Aborted { stage, plugin, source } => {
                assert_eq!(*stage, HookStage::PreSign);
                assert_eq!(plugin.internal_name, "b");
                assert_eq!(source.message(), "Document rejected by b");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fx.journal(), ["a:pre", "b:pre"]);
    }

    #[tokio::test]
    async fn test_sign_runs_full_flow() {
        let fx = Fixture::new(vec![
            ("a", Behavior::Append("+a"), Behavior::Append("#a")),
            ("b", Behavior::Append("+b"), Behavior::Append("#b")),
        ])
        .await;
        let signer = EchoSigner::new();

        let signed = fx
            .pipeline()
            .sign(SigningRequest::new(b"doc".to_vec(), "XAdES"), &signer)
            .await
            .unwrap();

        assert_eq!(signed.signature, b"SIG(doc+a+b)#a#b");
        assert_eq!(signed.cert_chain.len(), 1);
        assert_eq!(
            signed.run.states(),
            [
                PipelineState::Idle,
                PipelineState::PreProcessing,
                PipelineState::Signing,
                PipelineState::PostProcessing,
                PipelineState::Done,
            ]
        );
        assert_eq!(
            fx.journal(),
            ["a:pre", "b:pre", "a:post", "b:post", "a:reset", "b:reset"]
        );
        assert!(fx.bootstrap.is_configured());
    }

    #[tokio::test]
    async fn test_sign_never_calls_signer_after_pre_abort() {
        let fx = Fixture::new(vec![
            ("a", Behavior::Fail("no"), Behavior::Append("")),
            ("b", Behavior::Append("+b"), Behavior::Append("")),
        ])
        .await;
        let signer = EchoSigner::new();

        let err = fx
            .pipeline()
            .sign(SigningRequest::new(b"doc".to_vec(), SignatureFormat::CAdES), &signer)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Aborted { stage: HookStage::PreSign, .. }));
        assert_eq!(signer.calls.load(Ordering::SeqCst), 0);
        assert!(!fx.bootstrap.is_configured());
        assert_eq!(fx.journal(), ["a:pre", "a:reset", "b:reset"]);
    }

    #[tokio::test]
    async fn test_aborted_run_is_recorded() {
        let fx = Fixture::new(vec![
            ("a", Behavior::Append("+a"), Behavior::Append("")),
            ("b", Behavior::Fail("Policy missing"), Behavior::Append("")),
        ])
        .await;
        let signer = EchoSigner::new();
        let mut run = SigningRun::new();

        let err = fx
            .pipeline()
            .sign_run(&mut run, SigningRequest::new(b"doc".to_vec(), "XAdES"), &signer)
            .await
            .unwrap_err();

        assert_eq!(err.plugin().map(|p| p.internal_name.as_str()), Some("b"));
        assert_eq!(
            run.states(),
            [
                PipelineState::Idle,
                PipelineState::PreProcessing,
                PipelineState::Aborted,
            ]
        );
        assert!(run.state().is_terminal());
    }

    #[tokio::test]
    async fn test_signer_failure_run_ends_aborted() {
        let fx = Fixture::new(vec![("a", Behavior::Append(""), Behavior::Append(""))]).await;
        let signer = EchoSigner::failing();
        let mut run = SigningRun::new();

        let result = fx
            .pipeline()
            .sign_run(&mut run, SigningRequest::new(b"doc".to_vec(), "XAdES"), &signer)
            .await;

        assert!(matches!(result, Err(PipelineError::Signer(_))));
        assert_eq!(
            run.states(),
            [
                PipelineState::Idle,
                PipelineState::PreProcessing,
                PipelineState::Signing,
                PipelineState::Aborted,
            ]
        );
    }

    #[tokio::test]
    async fn test_sign_run_restarts_finished_run() {
        let fx = Fixture::new(vec![]).await;
        let signer = EchoSigner::new();
        let pipeline = fx.pipeline();
        let mut run = SigningRun::new();

        let first = pipeline
            .sign_run(&mut run, SigningRequest::new(b"one".to_vec(), "XAdES"), &signer)
            .await
            .unwrap();
        let first_id = run.id();
        pipeline
            .sign_run(&mut run, SigningRequest::new(b"two".to_vec(), "XAdES"), &signer)
            .await
            .unwrap();

        assert_eq!(first.run.id(), first_id);
        assert_ne!(run.id(), first_id);
        assert_eq!(run.state(), PipelineState::Done);
    }

    #[tokio::test]
    async fn test_post_sign_abort() {
        let fx = Fixture::new(vec![
            ("a", Behavior::Append(""), Behavior::Fail("Timestamp server down")),
            ("b", Behavior::Append(""), Behavior::Append("#b")),
        ])
        .await;
        let signer = EchoSigner::new();

        let err = fx
            .pipeline()
            .sign(SigningRequest::new(b"doc".to_vec(), "XAdES"), &signer)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Aborted { stage: HookStage::PostSign, .. }));
        assert_eq!(err.user_message(), "Timestamp server down");
        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
        assert!(!fx.journal().contains(&"b:post".to_string()));
    }

    #[tokio::test]
    async fn test_signer_failure_aborts_and_resets() {
        let fx = Fixture::new(vec![("a", Behavior::Append(""), Behavior::Append(""))]).await;
        let signer = EchoSigner::failing();

        let err = fx
            .pipeline()
            .sign(SigningRequest::new(b"doc".to_vec(), "XAdES"), &signer)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Signer(_)));
        assert_eq!(fx.journal(), ["a:pre", "a:reset"]);
    }

    #[tokio::test]
    async fn test_hook_timeout_aborts() {
        let fx = Fixture::new(vec![
            ("slow", Behavior::Hang, Behavior::Append("")),
            ("next", Behavior::Append("+n"), Behavior::Append("")),
        ])
        .await;
        let pipeline = fx
            .pipeline()
            .with_hook_timeout(Some(Duration::from_millis(50)));

        let err = pipeline
            .run_pre_sign(b"doc".to_vec(), &SignatureFormat::XAdES)
            .await
            .unwrap_err();

        match err {
            PipelineError::HookTimeout { stage, plugin, timeout } => {
                assert_eq!(stage, HookStage::PreSign);
                assert_eq!(plugin.internal_name, "slow");
                assert_eq!(timeout, Duration::from_millis(50));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fx.journal(), ["slow:pre"]);
    }

    #[tokio::test]
    async fn test_concurrent_operations_are_independent() {
        let fx = Fixture::new(vec![("a", Behavior::Append("+a"), Behavior::Append("#a"))]).await;
        let pipeline = Arc::new(fx.pipeline());
        let signer = Arc::new(EchoSigner::new());

        let mut tasks = Vec::new();
        for i in 0..4u8 {
            let pipeline = Arc::clone(&pipeline);
            let signer = Arc::clone(&signer);
            tasks.push(tokio::spawn(async move {
                pipeline
                    .sign(SigningRequest::new(vec![b'0' + i], "XAdES"), signer.as_ref())
                    .await
                    .map(|s| s.signature)
            }));
        }
        for (i, task) in tasks.into_iter().enumerate() {
            let signature = task.await.unwrap().unwrap();
            let expected = format!("SIG({}+a)#a", i);
            assert_eq!(signature, expected.as_bytes());
        }
        assert_eq!(signer.calls.load(Ordering::SeqCst), 4);
    }
}
