// SPDX-License-Identifier: CEPL-1.0
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{c_char, CStr, CString};
use tracing::{debug, info, warn};
use vesta_core::SetupArena;

use crate::error::{QueueRole, RenderError, RenderResult, Requirement, VkCheck};
use crate::messenger::DebugMessenger;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Layers and extras requested at instance creation. The window-system
/// extensions are always added on top of `extensions`.
#[derive(Clone, Debug)]
pub struct InstanceConfig {
    pub application_name: CString,
    pub validation: bool,
    pub layers: Vec<CString>,
    pub extensions: Vec<CString>,
}

impl InstanceConfig {
    pub fn for_validation(validation: bool) -> Self {
        let (layers, extensions) = if validation {
            (
                vec![VALIDATION_LAYER.to_owned()],
                vec![ash::ext::debug_utils::NAME.to_owned()],
            )
        } else {
            (Vec::new(), Vec::new())
        };
        Self {
            application_name: c"vesta".to_owned(),
            validation,
            layers,
            extensions,
        }
    }
}

/// Fails with the first requested name absent from `available`.
pub fn check_supported<'a>(
    kind: Requirement,
    requested: &[&CStr],
    available: impl Iterator<Item = &'a CStr> + Clone,
) -> RenderResult<()> {
    for want in requested {
        if !available.clone().any(|have| have == *want) {
            return Err(RenderError::Unsupported {
                kind,
                name: want.to_string_lossy().into_owned(),
            });
        }
    }
    Ok(())
}

/// Discrete first, then integrated, then whatever came first.
pub fn select_physical_device(types: &[vk::PhysicalDeviceType]) -> Option<usize> {
    let tier = |want: vk::PhysicalDeviceType| types.iter().position(|&t| t == want);
    tier(vk::PhysicalDeviceType::DISCRETE_GPU)
        .or_else(|| tier(vk::PhysicalDeviceType::INTEGRATED_GPU))
        .or_else(|| (!types.is_empty()).then_some(0))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilies {
    pub fn complete(self) -> RenderResult<QueueFamilyPair> {
        let graphics = self
            .graphics
            .ok_or(RenderError::QueueFamilyMissing(QueueRole::Graphics))?;
        let present = self
            .present
            .ok_or(RenderError::QueueFamilyMissing(QueueRole::Present))?;
        Ok(QueueFamilyPair { graphics, present })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyPair {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyPair {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    pub fn indices(&self) -> [u32; 2] {
        [self.graphics, self.present]
    }

    /// Family indices to request queues from, each once.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            self.indices().to_vec()
        }
    }
}

/// Scans families in order and keeps the first match for each role.
pub fn resolve_queue_families<E>(
    props: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> Result<bool, E>,
) -> Result<QueueFamilies, E> {
    let mut found = QueueFamilies::default();
    for (i, p) in props.iter().enumerate() {
        let i = i as u32;
        if found.present.is_none() && supports_present(i)? {
            found.present = Some(i);
        }
        if found.graphics.is_none() && p.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            found.graphics = Some(i);
        }
        if found.graphics.is_some() && found.present.is_some() {
            break;
        }
    }
    Ok(found)
}

/// ash returns enumerations as a `Vec`; the arena keeps a copy and the `Vec`
/// is freed on return. The copy is what setup code borrows and what the
/// arena limit accounts for.
fn stage<'a, T: Copy>(arena: &'a SetupArena, items: Vec<T>) -> RenderResult<&'a [T]> {
    Ok(arena.copy_slice(&items)?)
}

/// Instance, surface, chosen GPU and its logical device.
pub struct DeviceContext {
    pub entry: Entry,
    pub instance: Instance,
    debug: Option<DebugMessenger>,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub swapchain_loader: swapchain::Device,
    pub queue_families: QueueFamilyPair,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
}

impl DeviceContext {
    pub unsafe fn new(
        cfg: &InstanceConfig,
        display: RawDisplayHandle,
        window: RawWindowHandle,
        arena: &SetupArena,
    ) -> RenderResult<Self> {
        // STRICT ORDER:
        // 1) loader -> instance (+ messenger) -> surface
        // 2) physical device -> queue families -> device extensions
        // 3) logical device -> queues
        let entry = Entry::load()?;
        let instance = create_instance(&entry, cfg, display, arena)?;

        let debug = if cfg.validation {
            Some(DebugMessenger::new(&entry, &instance)?)
        } else {
            None
        };

        let surface_loader = surface::Instance::new(&entry, &instance);
        let surface = ash_window::create_surface(&entry, &instance, display, window, None)
            .check("vkCreateSurfaceKHR")?;
        info!("vk: surface created");

        let physical_device = pick_physical_device(&instance, arena)?;

        let family_props = stage(
            arena,
            instance.get_physical_device_queue_family_properties(physical_device),
        )?;
        let queue_families = resolve_queue_families(family_props, |i| {
            surface_loader.get_physical_device_surface_support(physical_device, i, surface)
        })
        .check("vkGetPhysicalDeviceSurfaceSupportKHR")?
        .complete()?;
        info!(
            "vk: queue families graphics={} present={}",
            queue_families.graphics, queue_families.present
        );

        let device_exts = stage(
            arena,
            instance
                .enumerate_device_extension_properties(physical_device)
                .check("vkEnumerateDeviceExtensionProperties")?,
        )?;
        let required_device_exts = [swapchain::NAME];
        check_supported(
            Requirement::DeviceExtension,
            &required_device_exts,
            device_exts.iter().filter_map(|e| e.extension_name_as_c_str().ok()),
        )?;

        let priority = [1.0f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .unique()
            .into_iter()
            .map(|family| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: priority.as_ptr(),
                ..Default::default()
            })
            .collect();
        let ext_ptrs: Vec<*const c_char> =
            required_device_exts.iter().map(|n| n.as_ptr()).collect();
        let features = vk::PhysicalDeviceFeatures::default();
        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_extension_count: ext_ptrs.len() as u32,
            pp_enabled_extension_names: ext_ptrs.as_ptr(),
            p_enabled_features: &features,
            ..Default::default()
        };
        let device = instance
            .create_device(physical_device, &dinfo, None)
            .check("vkCreateDevice")?;
        info!("vk: logical device created");

        let graphics_queue = device.get_device_queue(queue_families.graphics, 0);
        let present_queue = device.get_device_queue(queue_families.present, 0);
        let swapchain_loader = swapchain::Device::new(&instance, &device);

        Ok(Self {
            entry,
            instance,
            debug,
            surface_loader,
            surface,
            physical_device,
            device,
            swapchain_loader,
            queue_families,
            graphics_queue,
            present_queue,
        })
    }

    /// Device, then surface, then messenger, then instance.
    pub unsafe fn destroy(&mut self) {
        debug!("vk: destroying device, surface and instance");
        self.device.destroy_device(None);
        self.surface_loader.destroy_surface(self.surface, None);
        self.surface = vk::SurfaceKHR::null();
        if let Some(mut debug) = self.debug.take() {
            debug.destroy();
        }
        self.instance.destroy_instance(None);
    }
}

unsafe fn create_instance(
    entry: &Entry,
    cfg: &InstanceConfig,
    display: RawDisplayHandle,
    arena: &SetupArena,
) -> RenderResult<Instance> {
    let wsi = ash_window::enumerate_required_extensions(display)
        .check("vkEnumerateInstanceExtensionProperties")?;
    let mut ext_names: Vec<&CStr> = wsi.iter().map(|&p| CStr::from_ptr(p)).collect();
    ext_names.extend(cfg.extensions.iter().map(CString::as_c_str));
    let layer_names: Vec<&CStr> = cfg.layers.iter().map(CString::as_c_str).collect();

    let layers = stage(
        arena,
        entry
            .enumerate_instance_layer_properties()
            .check("vkEnumerateInstanceLayerProperties")?,
    )?;
    check_supported(
        Requirement::Layer,
        &layer_names,
        layers.iter().filter_map(|l| l.layer_name_as_c_str().ok()),
    )?;

    let exts = stage(
        arena,
        entry
            .enumerate_instance_extension_properties(None)
            .check("vkEnumerateInstanceExtensionProperties")?,
    )?;
    check_supported(
        Requirement::InstanceExtension,
        &ext_names,
        exts.iter().filter_map(|e| e.extension_name_as_c_str().ok()),
    )?;

    for l in &layer_names {
        info!("vk: layer {}", l.to_string_lossy());
    }
    for e in &ext_names {
        info!("vk: instance extension {}", e.to_string_lossy());
    }

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: cfg.application_name.as_ptr(),
        application_version: 0,
        p_engine_name: cfg.application_name.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };
    let ext_ptrs: Vec<*const c_char> = ext_names.iter().map(|n| n.as_ptr()).collect();
    let layer_ptrs: Vec<*const c_char> = layer_names.iter().map(|n| n.as_ptr()).collect();
    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: ext_ptrs.len() as u32,
        pp_enabled_extension_names: ext_ptrs.as_ptr(),
        enabled_layer_count: layer_ptrs.len() as u32,
        pp_enabled_layer_names: layer_ptrs.as_ptr(),
        ..Default::default()
    };
    let instance = entry
        .create_instance(&create_info, None)
        .check("vkCreateInstance")?;
    info!("vk: instance created (validation={})", cfg.validation);
    Ok(instance)
}

unsafe fn pick_physical_device(
    instance: &Instance,
    arena: &SetupArena,
) -> RenderResult<vk::PhysicalDevice> {
    let devices = stage(
        arena,
        instance
            .enumerate_physical_devices()
            .check("vkEnumeratePhysicalDevices")?,
    )?;
    let types: Vec<vk::PhysicalDeviceType> = devices
        .iter()
        .map(|&d| instance.get_physical_device_properties(d).device_type)
        .collect();
    let idx = select_physical_device(&types).ok_or(RenderError::NoPhysicalDevice)?;
    let props = instance.get_physical_device_properties(devices[idx]);
    let name = props
        .device_name_as_c_str()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match types[idx] {
        vk::PhysicalDeviceType::DISCRETE_GPU | vk::PhysicalDeviceType::INTEGRATED_GPU => {
            info!("vk: physical device {name} ({:?})", types[idx])
        }
        other => warn!("vk: no discrete or integrated GPU, using {name} ({other:?})"),
    }
    Ok(devices[idx])
}
