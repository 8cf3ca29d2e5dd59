use crate::models::BuildConfig;
use crate::services::exclude::ExcludeFilter;
use crate::services::ident;
use crate::services::process::CommandPlan;
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::fmt::Write as _;
use std::fs;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced before the packaging process starts.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("compiled executable not found at {0}; build the executable first")]
    MissingSource(Utf8PathBuf),

    #[error("{field} references a file that does not exist: {path}")]
    InvalidReference { field: String, path: Utf8PathBuf },

    #[error("failed to scan install payload: {0}")]
    Io(#[from] std::io::Error),
}

/// The installer-description document consumed by the packaging toolkit.
///
/// Models the product metadata, the main-executable component, one install
/// item per copy-beside entry, optional shortcut components, and optional UI
/// references. [`to_xml`](Self::to_xml) renders it as a WiX v4 `.wxs`
/// source. All component GUIDs are name-derived from the product name and
/// the component identifier, so successive builds of the same product keep
/// identical component identities.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDocument {
    pub product_name: String,
    pub manufacturer: String,
    pub version: String,
    pub description: String,
    pub url: String,
    pub upgrade_code: Uuid,
    pub icon: Option<Utf8PathBuf>,
    pub executable_name: String,
    pub main_component_guid: Uuid,
    pub items: Vec<InstallItem>,
    pub desktop_shortcut: bool,
    pub start_menu_shortcut: bool,
    pub banner_image: Option<String>,
    pub dialog_image: Option<String>,
    pub license_file: Option<String>,
}

/// One copy-beside entry in the install payload.
#[derive(Debug, Clone, PartialEq)]
pub enum InstallItem {
    File(FileComponent),
    Directory(DirectoryTree),
}

/// A single file installed directly under the install folder.
#[derive(Debug, Clone, PartialEq)]
pub struct FileComponent {
    pub component_id: String,
    pub guid: Uuid,
    pub file_id: String,
    pub name: String,
    /// Source path relative to the BinDir bindpath, `/`-separated.
    pub source: String,
}

/// A directory installed recursively, one component per directory that
/// carries files.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryTree {
    pub name: String,
    pub root: DirNode,
    pub components: Vec<DirComponent>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirNode {
    pub id: String,
    pub name: String,
    pub children: Vec<DirNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirComponent {
    pub id: String,
    pub guid: Uuid,
    pub directory_id: String,
    pub is_root: bool,
    pub files: Vec<FileRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileRef {
    pub id: String,
    pub name: String,
    pub source: String,
}

/// Translates a [`BuildConfig`] plus the compiled output into the installer
/// manifest and the packaging-stage command plan.
#[derive(Debug, Clone)]
pub struct InstallerManifestBuilder {
    /// Characters WiX forbids in identifiers.
    id_invalid: Regex,
    /// Identifiers must start with a letter or underscore.
    id_start: Regex,
}

impl InstallerManifestBuilder {
    pub fn new() -> Self {
        Self {
            id_invalid: Regex::new(r"[^a-zA-Z0-9.]+").expect("invalid id regex"),
            id_start: Regex::new(r"^[a-zA-Z_]").expect("invalid id-start regex"),
        }
    }

    /// Build the manifest document and the packaging invocation for it.
    ///
    /// `compiled_output` must name the compile stage's real output file;
    /// UI and license references are existence-checked here, at build time,
    /// because they may legitimately be absent at config-load time.
    pub fn build_manifest(
        &self,
        config: &BuildConfig,
        compiled_output: &Utf8Path,
    ) -> Result<(ManifestDocument, CommandPlan), ManifestError> {
        if !compiled_output.is_file() {
            return Err(ManifestError::MissingSource(compiled_output.to_path_buf()));
        }

        for (field, path) in [
            ("installer.ui.banner_image", &config.installer.ui.banner_image),
            ("installer.ui.dialog_image", &config.installer.ui.dialog_image),
            ("installer.license_file", &config.installer.license_file),
        ] {
            if !path.is_empty() && !Utf8Path::new(path).is_file() {
                return Err(ManifestError::InvalidReference {
                    field: field.to_string(),
                    path: Utf8PathBuf::from(path),
                });
            }
        }

        let metadata = &config.installer.metadata;
        let upgrade_code = match Uuid::parse_str(metadata.upgrade_code.trim()) {
            Ok(code) => code,
            // Empty (or config-load would have rejected it): derive from the
            // product name so the code is stable across builds.
            Err(_) => ident::derive(&metadata.product_name),
        };

        let exclude = ExcludeFilter::new(&config.exclude);
        let output_dir = Utf8PathBuf::from(&config.build.output.directory);

        let mut items = Vec::new();
        for item_name in &exclude.filter(&config.build.copy_beside) {
            let source = output_dir.join(item_name);
            if !source.exists() {
                tracing::warn!(
                    "Install item {} not found in build output {}, skipping",
                    item_name,
                    output_dir
                );
                continue;
            }

            if source.is_dir() {
                items.push(InstallItem::Directory(self.scan_directory(
                    &metadata.product_name,
                    item_name,
                    &source,
                    &exclude,
                )?));
            } else {
                let component_id = self.sanitize_id(&format!("Comp_{item_name}"));
                items.push(InstallItem::File(FileComponent {
                    guid: component_guid(&metadata.product_name, &component_id),
                    file_id: self.sanitize_id(&format!("File_{component_id}_{item_name}")),
                    component_id,
                    name: item_name.clone(),
                    source: item_name.replace('\\', "/"),
                }));
            }
        }

        let executable_name = config.build.output.filename.clone();
        let main_component_guid = component_guid(&metadata.product_name, "MainExecutable");

        let document = ManifestDocument {
            product_name: metadata.product_name.clone(),
            manufacturer: metadata.manufacturer.clone(),
            version: config.project.version.clone(),
            description: config.project.description.clone(),
            url: config.project.url.clone(),
            upgrade_code,
            icon: non_empty(&config.project.icon).map(Utf8PathBuf::from),
            executable_name,
            main_component_guid,
            items,
            desktop_shortcut: config.installer.shortcuts.desktop,
            start_menu_shortcut: config.installer.shortcuts.start_menu,
            banner_image: file_name_of(&config.installer.ui.banner_image),
            dialog_image: file_name_of(&config.installer.ui.dialog_image),
            license_file: file_name_of(&config.installer.license_file),
        };

        let plan = self.packaging_plan(config);
        Ok((document, plan))
    }

    /// Where the rendered manifest is written before packaging.
    pub fn wxs_path(&self, config: &BuildConfig) -> Utf8PathBuf {
        Utf8PathBuf::from(&config.installer.output.directory).join("installer.wxs")
    }

    /// The packaging toolkit invocation against the rendered manifest.
    fn packaging_plan(&self, config: &BuildConfig) -> CommandPlan {
        let mut plan = CommandPlan::new("wix")
            .arg("build")
            .arg(self.wxs_path(config).as_str())
            .arg("-bindpath")
            .arg(format!("BinDir={}", config.build.output.directory));

        let ui_dir = non_empty(&config.installer.ui.banner_image)
            .or(non_empty(&config.installer.ui.dialog_image))
            .and_then(|p| Utf8Path::new(p).parent())
            .map(Utf8Path::to_path_buf);
        if let Some(ui_dir) = ui_dir {
            plan = plan.arg("-bindpath").arg(format!("UiImagesDir={ui_dir}"));
        }

        if let Some(license_dir) = non_empty(&config.installer.license_file)
            .and_then(|p| Utf8Path::new(p).parent())
        {
            plan = plan.arg("-bindpath").arg(format!("LicenseDir={license_dir}"));
        }

        plan.args(["-ext", "WixToolset.UI.wixext"])
            .args(["-o", config.installer_output_path().as_str()])
    }

    /// Probe whether the packaging toolkit is on PATH at all.
    pub fn toolkit_probe_plan(&self) -> CommandPlan {
        CommandPlan::new("wix").arg("--version")
    }

    /// List installed toolkit extensions; the UI extension must be present.
    pub fn extension_list_plan(&self) -> CommandPlan {
        CommandPlan::new("wix").args(["extension", "list"])
    }

    /// Install the UI extension.
    pub fn extension_add_plan(&self) -> CommandPlan {
        CommandPlan::new("wix").args(["extension", "add", "WixToolset.UI.wixext"])
    }

    /// Name of the extension [`Self::extension_list_plan`] output must contain.
    pub const UI_EXTENSION: &'static str = "WixToolset.UI.wixext";

    /// Replace forbidden identifier characters, fix the leading character,
    /// and cap the length at WiX's 70-character identifier limit.
    fn sanitize_id(&self, name: &str) -> String {
        let mut sanitized = self
            .id_invalid
            .replace_all(name, "_")
            .trim_matches('_')
            .to_string();
        if sanitized.is_empty() || !self.id_start.is_match(&sanitized) {
            sanitized = format!("_{sanitized}");
        }
        sanitized.chars().take(70).collect()
    }

    /// Recursively scan one copy-beside directory into a directory tree and
    /// per-directory components, in sorted order for deterministic output.
    fn scan_directory(
        &self,
        product_name: &str,
        item_name: &str,
        source: &Utf8Path,
        exclude: &ExcludeFilter,
    ) -> Result<DirectoryTree, ManifestError> {
        let root_id = self.sanitize_id(&format!("Dir_{item_name}"));
        let mut components = Vec::new();
        let root = self.scan_node(
            product_name,
            item_name,
            &root_id,
            source,
            Utf8Path::new(""),
            root_id.clone(),
            item_name.to_string(),
            exclude,
            &mut components,
        )?;

        Ok(DirectoryTree {
            name: item_name.to_string(),
            root,
            components,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn scan_node(
        &self,
        product_name: &str,
        item_name: &str,
        root_id: &str,
        dir: &Utf8Path,
        relative: &Utf8Path,
        node_id: String,
        node_name: String,
        exclude: &ExcludeFilter,
        components: &mut Vec<DirComponent>,
    ) -> Result<DirNode, ManifestError> {
        let mut entries: Vec<Utf8PathBuf> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if let Ok(utf8) = Utf8PathBuf::try_from(path) {
                entries.push(utf8);
            }
        }
        entries.sort();

        let is_root = relative.as_str().is_empty();
        let mut children = Vec::new();
        let mut files = Vec::new();

        for entry in entries {
            let entry_name = entry.file_name().unwrap_or_default().to_string();
            let entry_rel = if is_root {
                Utf8PathBuf::from(&entry_name)
            } else {
                relative.join(&entry_name)
            };
            let full_rel = format!("{item_name}/{entry_rel}");
            if exclude.is_excluded(&full_rel) {
                tracing::debug!("Excluding install payload entry: {}", full_rel);
                continue;
            }

            if entry.is_dir() {
                let child_id = self.sanitize_id(&format!(
                    "{root_id}_{}",
                    entry_rel.as_str().replace('/', "_")
                ));
                children.push(self.scan_node(
                    product_name,
                    item_name,
                    root_id,
                    &entry,
                    &entry_rel,
                    child_id,
                    entry_name,
                    exclude,
                    components,
                )?);
            } else {
                files.push((entry_name, full_rel));
            }
        }

        if !files.is_empty() || is_root {
            let suffix = relative.as_str().replace('/', "_");
            let component_id = self.sanitize_id(&format!("Comp_{item_name}_{suffix}"));
            let file_refs = files
                .into_iter()
                .map(|(name, source)| FileRef {
                    id: self.sanitize_id(&format!("File_{component_id}_{name}")),
                    name,
                    source,
                })
                .collect();
            components.push(DirComponent {
                guid: component_guid(product_name, &component_id),
                id: component_id,
                directory_id: node_id.clone(),
                is_root,
                files: file_refs,
            });
        }

        Ok(DirNode {
            id: node_id,
            name: node_name,
            children,
        })
    }
}

impl Default for InstallerManifestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic component GUID: same product and component id, same GUID,
/// on every build.
fn component_guid(product_name: &str, component_id: &str) -> Uuid {
    ident::derive(&format!("{product_name}/{component_id}"))
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() { None } else { Some(value) }
}

fn file_name_of(path: &str) -> Option<String> {
    non_empty(path).and_then(|p| Utf8Path::new(p).file_name().map(str::to_string))
}

/// Minimal XML text/attribute escaping.
fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl ManifestDocument {
    /// Render the document as WiX v4 source.
    pub fn to_xml(&self) -> String {
        let name = xml_escape(&self.product_name);
        let manufacturer = xml_escape(&self.manufacturer);
        let description = xml_escape(&self.description);
        let exe = xml_escape(&self.executable_name);

        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str(concat!(
            "<Wix xmlns=\"http://wixtoolset.org/schemas/v4/wxs\"\n",
            "     xmlns:ui=\"http://wixtoolset.org/schemas/v4/wxs/ui\">\n",
        ));
        let _ = writeln!(
            xml,
            "  <Package Name=\"{name}\" Manufacturer=\"{manufacturer}\" Version=\"{}\" UpgradeCode=\"{}\" Scope=\"perMachine\">",
            xml_escape(&self.version),
            self.upgrade_code
        );
        xml.push_str(
            "    <MajorUpgrade DowngradeErrorMessage=\"A newer version of [ProductName] is already installed.\" />\n",
        );
        xml.push_str("    <MediaTemplate EmbedCab=\"yes\" />\n");

        if let Some(icon) = &self.icon {
            let _ = writeln!(
                xml,
                "    <Icon Id=\"app.ico\" SourceFile=\"{}\" />",
                xml_escape(icon.as_str())
            );
            xml.push_str("    <Property Id=\"ARPPRODUCTICON\" Value=\"app.ico\" />\n");
        }

        if !self.url.is_empty() {
            let url = xml_escape(&self.url);
            let _ = writeln!(xml, "    <Property Id=\"ARPURLINFOABOUT\" Value=\"{url}\" />");
            let _ = writeln!(xml, "    <Property Id=\"ARPHELPLINK\" Value=\"{url}\" />");
        }
        let _ = writeln!(xml, "    <Property Id=\"ARPCOMMENTS\" Value=\"{description}\" />");
        let _ = writeln!(xml, "    <Property Id=\"ARPCONTACT\" Value=\"{manufacturer}\" />");
        xml.push_str("    <Property Id=\"ARPNOREPAIR\" Value=\"1\" />\n");

        // Install folder with the main executable and the payload items.
        xml.push_str("    <StandardDirectory Id=\"ProgramFiles64Folder\">\n");
        let _ = writeln!(xml, "      <Directory Id=\"INSTALLFOLDER\" Name=\"{name}\">");
        let _ = writeln!(
            xml,
            "        <Component Id=\"MainExecutable\" Guid=\"{}\">",
            self.main_component_guid
        );
        let _ = writeln!(
            xml,
            "          <File Id=\"MainEXE\" Name=\"{exe}\" Source=\"!(bindpath.BinDir)\\{exe}\" KeyPath=\"yes\">"
        );
        xml.push_str("            <Permission User=\"Everyone\" GenericAll=\"yes\" />\n");
        xml.push_str("          </File>\n");
        let _ = writeln!(
            xml,
            "          <RegistryValue Root=\"HKLM\" Key=\"Software\\{name}\" Name=\"InstallPath\" Type=\"string\" Value=\"[INSTALLFOLDER]\" />"
        );
        xml.push_str("        </Component>\n");

        for item in &self.items {
            match item {
                InstallItem::File(file) => self.write_file_component(&mut xml, file),
                InstallItem::Directory(tree) => self.write_directory_tree(&mut xml, tree),
            }
        }

        xml.push_str("      </Directory>\n");
        xml.push_str("    </StandardDirectory>\n");

        if self.start_menu_shortcut {
            self.write_start_menu(&mut xml, &name, &manufacturer, &description, &exe);
        }
        if self.desktop_shortcut {
            self.write_desktop(&mut xml, &name, &manufacturer, &exe);
        }

        // Feature tree rooted at the product.
        let _ = writeln!(
            xml,
            "    <Feature Id=\"ProductFeature\" Title=\"{name}\" Level=\"1\">"
        );
        xml.push_str("      <ComponentRef Id=\"MainExecutable\" />\n");
        if self.start_menu_shortcut {
            xml.push_str("      <ComponentRef Id=\"ApplicationShortcuts\" />\n");
        }
        if self.desktop_shortcut {
            xml.push_str("      <ComponentRef Id=\"DesktopShortcut\" />\n");
        }
        for item in &self.items {
            match item {
                InstallItem::File(file) => {
                    let _ = writeln!(xml, "      <ComponentRef Id=\"{}\" />", file.component_id);
                }
                InstallItem::Directory(tree) => {
                    for component in &tree.components {
                        let _ = writeln!(xml, "      <ComponentRef Id=\"{}\" />", component.id);
                    }
                }
            }
        }
        xml.push_str("    </Feature>\n");

        // Installer UI wiring.
        xml.push_str("    <Property Id=\"WIXUI_INSTALLDIR\" Value=\"INSTALLFOLDER\" />\n");
        let _ = writeln!(
            xml,
            "    <Property Id=\"WIXUI_EXITDIALOGOPTIONALTEXT\" Value=\"Thank you for installing {name}.\" />"
        );
        if let Some(dialog) = &self.dialog_image {
            let _ = writeln!(
                xml,
                "    <WixVariable Id=\"WixUIDialogBmp\" Value=\"!(bindpath.UiImagesDir)\\{}\" />",
                xml_escape(dialog)
            );
        }
        if let Some(banner) = &self.banner_image {
            let _ = writeln!(
                xml,
                "    <WixVariable Id=\"WixUIBannerBmp\" Value=\"!(bindpath.UiImagesDir)\\{}\" />",
                xml_escape(banner)
            );
        }
        if let Some(license) = &self.license_file {
            let _ = writeln!(
                xml,
                "    <WixVariable Id=\"WixUILicenseRtf\" Value=\"!(bindpath.LicenseDir)\\{}\" />",
                xml_escape(license)
            );
        }
        xml.push_str("    <ui:WixUI Id=\"WixUI_InstallDir\" />\n");

        xml.push_str("  </Package>\n</Wix>\n");
        xml
    }

    fn write_file_component(&self, xml: &mut String, file: &FileComponent) {
        let _ = writeln!(
            xml,
            "        <Component Id=\"{}\" Guid=\"{}\">",
            file.component_id, file.guid
        );
        let _ = writeln!(
            xml,
            "          <File Id=\"{}\" Name=\"{}\" Source=\"!(bindpath.BinDir)\\{}\" KeyPath=\"yes\" />",
            file.file_id,
            xml_escape(&file.name),
            xml_escape(&file.source)
        );
        xml.push_str("        </Component>\n");
    }

    fn write_directory_tree(&self, xml: &mut String, tree: &DirectoryTree) {
        self.write_dir_node(xml, &tree.root, 8);
        for component in &tree.components {
            let _ = writeln!(
                xml,
                "        <Component Id=\"{}\" Guid=\"{}\" Directory=\"{}\">",
                component.id, component.guid, component.directory_id
            );
            if component.is_root {
                xml.push_str("          <CreateFolder/>\n");
            }
            for file in &component.files {
                let _ = writeln!(
                    xml,
                    "          <File Id=\"{}\" Name=\"{}\" Source=\"!(bindpath.BinDir)\\{}\" />",
                    file.id,
                    xml_escape(&file.name),
                    xml_escape(&file.source)
                );
            }
            if component.is_root {
                let _ = writeln!(
                    xml,
                    "          <RemoveFolder Id=\"Remove_{}\" On=\"uninstall\"/>",
                    component.directory_id
                );
            }
            let _ = writeln!(
                xml,
                "          <RegistryValue Root=\"HKCU\" Key=\"Software\\{}\\{}\\{}\" Name=\"installed\" Type=\"integer\" Value=\"1\" KeyPath=\"yes\" />",
                xml_escape(&self.manufacturer),
                xml_escape(&self.product_name),
                component.id
            );
            xml.push_str("        </Component>\n");
        }
    }

    fn write_dir_node(&self, xml: &mut String, node: &DirNode, indent: usize) {
        let pad = " ".repeat(indent);
        let _ = writeln!(
            xml,
            "{pad}<Directory Id=\"{}\" Name=\"{}\">",
            node.id,
            xml_escape(&node.name)
        );
        for child in &node.children {
            self.write_dir_node(xml, child, indent + 2);
        }
        let _ = writeln!(xml, "{pad}</Directory>");
    }

    fn write_start_menu(
        &self,
        xml: &mut String,
        name: &str,
        manufacturer: &str,
        description: &str,
        exe: &str,
    ) {
        xml.push_str("    <StandardDirectory Id=\"ProgramMenuFolder\">\n");
        let _ = writeln!(
            xml,
            "      <Directory Id=\"ApplicationProgramsFolder\" Name=\"{name}\">"
        );
        let _ = writeln!(
            xml,
            "        <Component Id=\"ApplicationShortcuts\" Guid=\"{}\">",
            component_guid(&self.product_name, "ApplicationShortcuts")
        );
        let icon_attr = if self.icon.is_some() {
            " Icon=\"app.ico\""
        } else {
            ""
        };
        let _ = writeln!(
            xml,
            "          <Shortcut Id=\"ApplicationShortcut\" Name=\"{name}\" Description=\"{description}\" Target=\"[INSTALLFOLDER]{exe}\" WorkingDirectory=\"INSTALLFOLDER\"{icon_attr} />"
        );
        let _ = writeln!(
            xml,
            "          <Shortcut Id=\"UninstallProduct\" Name=\"Uninstall {name}\" Description=\"Uninstall {name}\" Target=\"[SystemFolder]msiexec.exe\" Arguments=\"/x [ProductCode]\"/>"
        );
        xml.push_str(
            "          <RemoveFolder Id=\"CleanUpShortCut\" Directory=\"ApplicationProgramsFolder\" On=\"uninstall\" />\n",
        );
        let _ = writeln!(
            xml,
            "          <RegistryValue Root=\"HKCU\" Key=\"Software\\{manufacturer}\\{name}\" Name=\"installed\" Type=\"integer\" Value=\"1\" KeyPath=\"yes\" />"
        );
        xml.push_str("        </Component>\n");
        xml.push_str("      </Directory>\n");
        xml.push_str("    </StandardDirectory>\n");
    }

    fn write_desktop(&self, xml: &mut String, name: &str, manufacturer: &str, exe: &str) {
        xml.push_str("    <StandardDirectory Id=\"DesktopFolder\">\n");
        let _ = writeln!(
            xml,
            "      <Component Id=\"DesktopShortcut\" Guid=\"{}\">",
            component_guid(&self.product_name, "DesktopShortcut")
        );
        let _ = writeln!(
            xml,
            "        <Shortcut Id=\"DesktopApplicationShortcut\" Name=\"{name}\" Target=\"[INSTALLFOLDER]{exe}\" WorkingDirectory=\"INSTALLFOLDER\" />"
        );
        let _ = writeln!(
            xml,
            "        <RegistryValue Root=\"HKCU\" Key=\"Software\\{manufacturer}\\{name}\\Desktop\" Name=\"installed\" Type=\"integer\" Value=\"1\" KeyPath=\"yes\" />"
        );
        xml.push_str("      </Component>\n");
        xml.push_str("    </StandardDirectory>\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_id() {
        let builder = InstallerManifestBuilder::new();
        assert_eq!(builder.sanitize_id("my app-1.0"), "my_app_1.0");
        assert_eq!(builder.sanitize_id("9lives"), "_9lives");
        assert_eq!(builder.sanitize_id("__x__"), "x");
        assert_eq!(builder.sanitize_id(""), "_");
        assert!(builder.sanitize_id(&"a".repeat(100)).len() <= 70);
    }

    #[test]
    fn test_component_guid_is_stable() {
        assert_eq!(
            component_guid("Acme", "MainExecutable"),
            component_guid("Acme", "MainExecutable")
        );
        assert_ne!(
            component_guid("Acme", "MainExecutable"),
            component_guid("Other", "MainExecutable")
        );
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }

    fn minimal_document() -> ManifestDocument {
        ManifestDocument {
            product_name: "Acme App".to_string(),
            manufacturer: "Acme & Sons".to_string(),
            version: "1.0.0".to_string(),
            description: "Demo".to_string(),
            url: String::new(),
            upgrade_code: ident::derive("Acme App"),
            icon: None,
            executable_name: "acme.exe".to_string(),
            main_component_guid: component_guid("Acme App", "MainExecutable"),
            items: Vec::new(),
            desktop_shortcut: false,
            start_menu_shortcut: true,
            banner_image: None,
            dialog_image: None,
            license_file: None,
        }
    }

    #[test]
    fn test_to_xml_escapes_and_references() {
        let xml = minimal_document().to_xml();
        assert!(xml.contains("Name=\"Acme App\""));
        assert!(xml.contains("Manufacturer=\"Acme &amp; Sons\""));
        assert!(xml.contains(&ident::derive("Acme App").to_string()));
        assert!(xml.contains("<ComponentRef Id=\"ApplicationShortcuts\" />"));
        assert!(!xml.contains("DesktopShortcut"));
        assert!(!xml.contains("WixUILicenseRtf"));
        assert!(!xml.contains("ARPURLINFOABOUT"));
    }

    #[test]
    fn test_to_xml_desktop_only() {
        let mut document = minimal_document();
        document.start_menu_shortcut = false;
        document.desktop_shortcut = true;
        let xml = document.to_xml();
        assert!(xml.contains("<ComponentRef Id=\"DesktopShortcut\" />"));
        assert!(!xml.contains("ApplicationShortcuts"));
    }

    #[test]
    fn test_to_xml_ui_references() {
        let mut document = minimal_document();
        document.banner_image = Some("banner.bmp".to_string());
        document.dialog_image = Some("dialog.bmp".to_string());
        document.license_file = Some("license.rtf".to_string());
        let xml = document.to_xml();
        assert!(xml.contains("WixUIBannerBmp"));
        assert!(xml.contains("WixUIDialogBmp"));
        assert!(xml.contains("!(bindpath.LicenseDir)\\license.rtf"));
    }
}
