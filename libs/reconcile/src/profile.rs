//! Per-kind capabilities: identity style, default replicas, template derivation.
//!
//! Broker, scheduler and worker are reconciled by the same engine; these
//! profiles are the only place where the kinds differ.

use fleet_model::{
    ChildKind, ChildTemplate, Container, ContainerPort, ResourceRequirements, SchedulerDescriptor,
    WorkerDescriptor,
};

use crate::identity::IdentityStyle;

/// Image for a provisioned broker.
pub const BROKER_IMAGE: &str = "redis:3.0.5";

/// Port a provisioned broker listens on.
pub const BROKER_PORT: u16 = 6379;

/// Capability set for one child kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindProfile {
    pub kind: ChildKind,
    pub identity_style: IdentityStyle,
    pub default_replicas: u32,
    pub container_name: &'static str,
}

const BROKER: KindProfile = KindProfile {
    kind: ChildKind::Broker,
    identity_style: IdentityStyle::Ordered,
    default_replicas: 1,
    container_name: "redis",
};

const SCHEDULER: KindProfile = KindProfile {
    kind: ChildKind::Scheduler,
    identity_style: IdentityStyle::Pool,
    default_replicas: 1,
    container_name: "celery-scheduler",
};

const WORKER: KindProfile = KindProfile {
    kind: ChildKind::Worker,
    identity_style: IdentityStyle::Pool,
    default_replicas: 1,
    container_name: "celery-worker",
};

impl KindProfile {
    pub fn of(kind: ChildKind) -> &'static KindProfile {
        match kind {
            ChildKind::Broker => &BROKER,
            ChildKind::Scheduler => &SCHEDULER,
            ChildKind::Worker => &WORKER,
        }
    }

    /// The single container an instance of this kind runs.
    pub fn container(&self, template: &ChildTemplate) -> Container {
        Container {
            name: self.container_name.to_string(),
            image: template.image.clone(),
            command: template.command.clone(),
            resources: template.resources.clone(),
            ports: template.ports.clone(),
        }
    }
}

/// A declared fleet entry that can be turned into a child template.
pub trait TemplateSource {
    const KIND: ChildKind;

    /// Declared replicas; `None` takes the kind default.
    fn replicas(&self) -> Option<u32>;

    /// Entry image; `None` inherits the fleet image.
    fn image(&self) -> Option<&str>;

    /// Command line for this entry against `broker_address`.
    fn command(&self, broker_address: &str) -> Vec<String>;

    fn resources(&self) -> &ResourceRequirements;

    fn target_queues(&self) -> &[String] {
        &[]
    }

    fn desired_replicas(&self) -> u32 {
        self.replicas()
            .unwrap_or(KindProfile::of(Self::KIND).default_replicas)
    }

    /// Derives the template, substituting `default_image` when the entry has none.
    fn derive_template(&self, default_image: &str, broker_address: &str) -> ChildTemplate {
        let image = match self.image() {
            Some(image) if !image.is_empty() => image,
            _ => default_image,
        };

        ChildTemplate {
            image: image.to_string(),
            command: self.command(broker_address),
            resources: self.resources().clone(),
            target_queues: self.target_queues().to_vec(),
            broker_address: broker_address.to_string(),
            ports: Vec::new(),
        }
    }
}

impl TemplateSource for WorkerDescriptor {
    const KIND: ChildKind = ChildKind::Worker;

    fn replicas(&self) -> Option<u32> {
        self.replicas
    }

    fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    fn command(&self, broker_address: &str) -> Vec<String> {
        worker_command(&self.app_name, broker_address, &self.target_queues)
    }

    fn resources(&self) -> &ResourceRequirements {
        &self.resources
    }

    fn target_queues(&self) -> &[String] {
        &self.target_queues
    }
}

impl TemplateSource for SchedulerDescriptor {
    const KIND: ChildKind = ChildKind::Scheduler;

    fn replicas(&self) -> Option<u32> {
        self.replicas
    }

    fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    fn command(&self, broker_address: &str) -> Vec<String> {
        scheduler_command(
            &self.app_name,
            broker_address,
            self.scheduler_class.as_deref(),
        )
    }

    fn resources(&self) -> &ResourceRequirements {
        &self.resources
    }
}

/// `celery worker -A <app> -b <broker> [--queues q1,q2]`.
pub fn worker_command(app_name: &str, broker_address: &str, queues: &[String]) -> Vec<String> {
    let mut command = vec![
        "celery".to_string(),
        "worker".to_string(),
        "-A".to_string(),
        app_name.to_string(),
        "-b".to_string(),
        broker_address.to_string(),
    ];
    if !queues.is_empty() {
        command.push("--queues".to_string());
        command.push(queues.join(","));
    }
    command
}

/// `celery beat -A <app> -b <broker> [--scheduler <class>]`.
pub fn scheduler_command(
    app_name: &str,
    broker_address: &str,
    scheduler_class: Option<&str>,
) -> Vec<String> {
    let mut command = vec![
        "celery".to_string(),
        "beat".to_string(),
        "-A".to_string(),
        app_name.to_string(),
        "-b".to_string(),
        broker_address.to_string(),
    ];
    if let Some(class) = scheduler_class.filter(|c| !c.is_empty()) {
        command.push("--scheduler".to_string());
        command.push(class.to_string());
    }
    command
}

/// Template for the provisioned broker's single instance.
pub fn broker_template() -> ChildTemplate {
    ChildTemplate {
        image: BROKER_IMAGE.to_string(),
        ports: vec![ContainerPort {
            name: "redis".to_string(),
            container_port: BROKER_PORT,
        }],
        ..Default::default()
    }
}
