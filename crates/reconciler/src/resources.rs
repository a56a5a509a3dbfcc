//! Builders for the objects derived from a ConfigServer.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec,
    Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};

use crate::types::{values_name, ConfigServer};

/// Label selecting the pods of a ConfigServer.
pub const APP_LABEL: &str = "app";

/// Name of the volume carrying the backing store.
pub const VOLUME_NAME: &str = "config";

/// Name of the serving port.
pub const PORT_NAME: &str = "http";

/// Environment variable advertising the store directory.
pub const ENV_DIR: &str = "CONFIG_SERVER_DIR";

/// Environment variable advertising the listen port.
pub const ENV_PORT: &str = "CONFIG_SERVER_PORT";

/// File mode of the mounted values (read-only for everyone).
pub const VALUES_FILE_MODE: i32 = 0o444;

fn selector_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), name.to_string())])
}

fn derived_meta(server: &ConfigServer, name: String, labels: bool) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: server.namespace(),
        labels: labels.then(|| selector_labels(&server.name_any())),
        owner_references: server.controller_owner_ref(&()).map(|owner| vec![owner]),
        ..ObjectMeta::default()
    }
}

/// Backing store pre-populated with already-declared values.
pub fn backing_store(server: &ConfigServer, data: BTreeMap<String, String>) -> ConfigMap {
    ConfigMap {
        metadata: derived_meta(server, values_name(&server.name_any()), false),
        data: Some(data),
        ..ConfigMap::default()
    }
}

/// Cluster-internal endpoint forwarding to the serving pods.
pub fn endpoint(server: &ConfigServer) -> Service {
    let name = server.name_any();
    let port = server.spec.container_port;

    Service {
        metadata: derived_meta(server, name.clone(), false),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector_labels(&name)),
            ports: Some(vec![ServicePort {
                name: Some(PORT_NAME.to_string()),
                protocol: Some("TCP".to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                ..ServicePort::default()
            }]),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

/// Single-replica deployment serving the mounted backing store.
pub fn deployment(server: &ConfigServer) -> Deployment {
    let name = server.name_any();
    let spec = &server.spec;

    let container = Container {
        name: name.clone(),
        image: Some(spec.image.clone()),
        image_pull_policy: Some(spec.image_pull_policy.clone()),
        ports: Some(vec![ContainerPort {
            name: Some(PORT_NAME.to_string()),
            container_port: spec.container_port,
            protocol: Some("TCP".to_string()),
            ..ContainerPort::default()
        }]),
        env: Some(vec![
            EnvVar {
                name: ENV_DIR.to_string(),
                value: Some(spec.config_mount_path.clone()),
                ..EnvVar::default()
            },
            EnvVar {
                name: ENV_PORT.to_string(),
                value: Some(spec.container_port.to_string()),
                ..EnvVar::default()
            },
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: VOLUME_NAME.to_string(),
            mount_path: spec.config_mount_path.clone(),
            read_only: Some(true),
            ..VolumeMount::default()
        }]),
        ..Container::default()
    };

    Deployment {
        metadata: derived_meta(server, name.clone(), true),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector_labels(&name)),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector_labels(&name)),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(vec![Volume {
                        name: VOLUME_NAME.to_string(),
                        config_map: Some(ConfigMapVolumeSource {
                            name: values_name(&name),
                            default_mode: Some(VALUES_FILE_MODE),
                            ..ConfigMapVolumeSource::default()
                        }),
                        ..Volume::default()
                    }]),
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::indexing_slicing)]

    use super::*;
    use crate::types::ConfigServerSpec;

    fn server() -> ConfigServer {
        let mut server = ConfigServer::new(
            "test-config-server",
            ConfigServerSpec {
                image: "ghcr.io/tu-wien-datalab/config-server:main".to_string(),
                image_pull_policy: "IfNotPresent".to_string(),
                container_port: 8080,
                config_mount_path: "/etc/values".to_string(),
            },
        );
        server.metadata.namespace = Some("ns".to_string());
        server
    }

    #[test]
    fn test_backing_store_name_and_data() {
        let data = BTreeMap::from([("x".to_string(), "{\"a\":1}".to_string())]);
        let cm = backing_store(&server(), data.clone());
        assert_eq!(cm.metadata.name.as_deref(), Some("test-config-server-values"));
        assert_eq!(cm.metadata.namespace.as_deref(), Some("ns"));
        assert_eq!(cm.data, Some(data));
    }

    #[test]
    fn test_endpoint_maps_port_to_itself() {
        let svc = endpoint(&server());
        let spec = svc.spec.expect("service spec");
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
        assert_eq!(
            spec.selector.and_then(|s| s.get(APP_LABEL).cloned()).as_deref(),
            Some("test-config-server")
        );
        let port = &spec.ports.expect("ports")[0];
        assert_eq!(port.port, 8080);
        assert_eq!(port.target_port, Some(IntOrString::Int(8080)));
        assert_eq!(port.name.as_deref(), Some(PORT_NAME));
    }

    #[test]
    fn test_deployment_mounts_values_read_only() {
        let dep = deployment(&server());
        let spec = dep.spec.expect("deployment spec");
        assert_eq!(spec.replicas, Some(1));

        let pod = spec.template.spec.expect("pod spec");
        let container = &pod.containers[0];
        assert_eq!(container.image.as_deref(), Some("ghcr.io/tu-wien-datalab/config-server:main"));
        assert_eq!(container.image_pull_policy.as_deref(), Some("IfNotPresent"));

        let env = container.env.clone().expect("env");
        let lookup = |name: &str| {
            env.iter()
                .find(|e| e.name == name)
                .and_then(|e| e.value.clone())
        };
        assert_eq!(lookup(ENV_DIR).as_deref(), Some("/etc/values"));
        assert_eq!(lookup(ENV_PORT).as_deref(), Some("8080"));

        let mount = &container.volume_mounts.clone().expect("mounts")[0];
        assert_eq!(mount.mount_path, "/etc/values");
        assert_eq!(mount.read_only, Some(true));

        let volume = &pod.volumes.expect("volumes")[0];
        let source = volume.config_map.clone().expect("config map volume");
        assert_eq!(source.name, "test-config-server-values");
        assert_eq!(source.default_mode, Some(0o444));
    }

    #[test]
    fn test_owner_reference_requires_uid() {
        assert!(endpoint(&server()).metadata.owner_references.is_none());

        let mut owned = server();
        owned.metadata.uid = Some("1234".to_string());
        let refs = endpoint(&owned).metadata.owner_references.expect("owner refs");
        assert_eq!(refs[0].kind, "ConfigServer");
        assert_eq!(refs[0].controller, Some(true));
    }
}
