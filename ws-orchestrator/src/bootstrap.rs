//! Cloud-init rendering for new workspace VMs.
//!
//! A pure function from a typed configuration to the user-data document,
//! so secret interpolation stays isolated and unit-testable without any
//! provider calls. The network-mode policy lives here too: direct mode
//! joins the overlay in the background and never blocks boot on it,
//! private mode blocks boot until the overlay is up and drops public
//! ingress.

use ws_store::NetworkMode;

/// Pre-existing session credentials carried over when a suspended
/// workspace is resumed, so the user's terminal identity survives.
#[derive(Debug, Clone)]
pub struct SessionKeys {
    pub public_key: String,
    pub private_key: String,
}

#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub hostname: String,
    /// Single-use overlay join secret
    pub network_secret: String,
    /// Linux device path of the attached persistent volume
    pub volume_device: String,
    pub session_keys: Option<SessionKeys>,
    /// Short-lived token the agent uses to upload freshly generated
    /// session credentials when none were carried over
    pub capture_token: Option<String>,
    pub network_mode: NetworkMode,
}

impl BootstrapConfig {
    /// Render the cloud-init user-data document
    pub fn render(&self) -> String {
        let mut doc = String::new();

        doc.push_str("#cloud-config\n");
        doc.push_str(&format!("hostname: {}\n", self.hostname));

        doc.push_str("write_files:\n");
        doc.push_str("  - path: /etc/workspace/overlay-auth-key\n");
        doc.push_str("    permissions: '0600'\n");
        doc.push_str(&format!("    content: {}\n", self.network_secret));

        if let Some(keys) = &self.session_keys {
            doc.push_str("  - path: /etc/workspace/session_key.pub\n");
            doc.push_str("    permissions: '0644'\n");
            doc.push_str(&format!("    content: {}\n", keys.public_key));
            doc.push_str("  - path: /etc/workspace/session_key\n");
            doc.push_str("    permissions: '0600'\n");
            doc.push_str(&format!("    content: {}\n", keys.private_key));
        }

        if let Some(token) = &self.capture_token {
            doc.push_str("  - path: /etc/workspace/capture-token\n");
            doc.push_str("    permissions: '0600'\n");
            doc.push_str(&format!("    content: {}\n", token));
        }

        doc.push_str("mounts:\n");
        doc.push_str(&format!(
            "  - [ {}, /workspace, ext4, 'defaults,nofail' ]\n",
            self.volume_device
        ));

        doc.push_str("runcmd:\n");
        // Format only a brand-new volume; an existing filesystem means
        // this is a resume and user data must survive.
        doc.push_str(&format!(
            "  - blkid {dev} || mkfs.ext4 -L workspace-data {dev}\n",
            dev = self.volume_device
        ));
        doc.push_str("  - mount -a\n");

        match self.network_mode {
            // Direct: public address is the primary path; the overlay
            // join runs with a bounded timeout and must not fail boot.
            NetworkMode::Direct => {
                doc.push_str(
                    "  - overlayctl up --auth-key-file /etc/workspace/overlay-auth-key \
                     --timeout 30s || true\n",
                );
            }
            // Private: the overlay is the only path in, so boot blocks
            // on it and public ingress is shut.
            NetworkMode::Private => {
                doc.push_str(
                    "  - overlayctl up --auth-key-file /etc/workspace/overlay-auth-key\n",
                );
                doc.push_str("  - ufw default deny incoming\n");
                doc.push_str("  - ufw allow in on overlay0\n");
                doc.push_str("  - ufw --force enable\n");
            }
        }

        doc.push_str("  - systemctl enable --now workspace-agent\n");

        doc
    }
}
