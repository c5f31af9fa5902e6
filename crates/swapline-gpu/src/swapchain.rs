//! Swapchain parameter selection.
//!
//! Pure functions over surface query results; the swapchain object itself is
//! owned by `swapline-present`.

use ash::vk;

/// Present mode requested by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentModePolicy {
    /// Vsync-on FIFO. Always supported.
    #[default]
    Fifo,
    /// Low-latency triple buffering.
    Mailbox,
    /// No vsync, may tear.
    Immediate,
}

impl PresentModePolicy {
    /// Policy for a vsync toggle.
    pub fn from_vsync(vsync: bool) -> Self {
        if vsync {
            Self::Fifo
        } else {
            Self::Mailbox
        }
    }
}

/// Select the best surface format.
///
/// Prefers `B8G8R8A8_SRGB` with `SRGB_NONLINEAR`; otherwise the first reported
/// format. `None` when the surface reports no formats.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
}

/// Select the present mode for a policy.
///
/// Mailbox falls back to immediate and then FIFO; immediate falls back to FIFO.
pub fn select_present_mode(
    available: &[vk::PresentModeKHR],
    policy: PresentModePolicy,
) -> vk::PresentModeKHR {
    let preferred: &[vk::PresentModeKHR] = match policy {
        PresentModePolicy::Fifo => &[],
        PresentModePolicy::Mailbox => &[vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE],
        PresentModePolicy::Immediate => &[vk::PresentModeKHR::IMMEDIATE],
    };

    preferred
        .iter()
        .copied()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Calculate swapchain extent.
///
/// A `current_extent.width` of `u32::MAX` means the surface lets the swapchain
/// pick; the desired size is then clamped into the reported limits and never
/// drops to zero.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let clamp = |desired: u32, min: u32, max: u32| desired.max(min).min(max).max(1);

    vk::Extent2D {
        width: clamp(
            desired_width,
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: clamp(
            desired_height,
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Sharing mode and the queue families listed with it.
pub fn select_sharing(graphics_family: u32, present_family: u32) -> (vk::SharingMode, Vec<u32>) {
    if graphics_family == present_family {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (
            vk::SharingMode::CONCURRENT,
            vec![graphics_family, present_family],
        )
    }
}

/// One image above the minimum, capped by the maximum (0 means unbounded).
pub fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Identity when supported, otherwise whatever the surface currently uses.
pub fn select_pre_transform(capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
    if capabilities
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        capabilities.current_transform
    }
}

/// Composite alpha: pre-multiplied, post-multiplied, inherit, else opaque.
pub fn select_composite_alpha(capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
    .into_iter()
    .find(|alpha| capabilities.supported_composite_alpha.contains(*alpha))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn flexible_caps() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 16,
                height: 8,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            ..Default::default()
        }
    }

    #[test]
    fn prefers_bgra_srgb() {
        let available = [
            format(vk::Format::B8G8R8A8_SRGB),
            format(vk::Format::R8G8B8A8_SRGB),
        ];
        assert_eq!(
            select_surface_format(&available),
            Some(format(vk::Format::B8G8R8A8_SRGB))
        );
    }

    #[test]
    fn falls_back_to_first_format() {
        let available = [format(vk::Format::R8G8B8A8_SRGB)];
        assert_eq!(
            select_surface_format(&available),
            Some(format(vk::Format::R8G8B8A8_SRGB))
        );
    }

    #[test]
    fn bgra_in_wrong_color_space_is_not_preferred() {
        let odd = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        };
        let available = [format(vk::Format::R8G8B8A8_UNORM), odd];
        assert_eq!(
            select_surface_format(&available),
            Some(format(vk::Format::R8G8B8A8_UNORM))
        );
    }

    #[test]
    fn no_formats_selects_nothing() {
        assert_eq!(select_surface_format(&[]), None);
    }

    #[test]
    fn present_mode_policies() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        let fifo_only = [vk::PresentModeKHR::FIFO];
        let no_mailbox = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];

        assert_eq!(
            select_present_mode(&all, PresentModePolicy::Fifo),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            select_present_mode(&all, PresentModePolicy::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            select_present_mode(&no_mailbox, PresentModePolicy::Mailbox),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            select_present_mode(&fifo_only, PresentModePolicy::Immediate),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn fixed_extent_is_used_verbatim() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            ..flexible_caps()
        };
        assert_eq!(
            calculate_extent(&caps, 10, 10),
            vk::Extent2D {
                width: 1280,
                height: 720
            }
        );
    }

    #[test]
    fn flexible_extent_clamps_into_limits() {
        let caps = flexible_caps();
        assert_eq!(
            calculate_extent(&caps, 800, 600),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
        assert_eq!(
            calculate_extent(&caps, 10_000, 10_000),
            vk::Extent2D {
                width: 4096,
                height: 2048
            }
        );
    }

    #[test]
    fn zero_request_clamps_to_minimum() {
        let caps = flexible_caps();
        assert_eq!(
            calculate_extent(&caps, 0, 0),
            vk::Extent2D {
                width: 16,
                height: 8
            }
        );
    }

    #[test]
    fn sharing_mode_follows_families() {
        assert_eq!(select_sharing(0, 0), (vk::SharingMode::EXCLUSIVE, vec![]));
        assert_eq!(
            select_sharing(0, 2),
            (vk::SharingMode::CONCURRENT, vec![0, 2])
        );
    }

    #[test]
    fn image_count_respects_maximum() {
        assert_eq!(select_image_count(&flexible_caps()), 3);

        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 3,
            ..flexible_caps()
        };
        assert_eq!(select_image_count(&capped), 3);

        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 4,
            max_image_count: 0,
            ..flexible_caps()
        };
        assert_eq!(select_image_count(&unbounded), 5);
    }

    #[test]
    fn transform_and_alpha_selection() {
        let caps = vk::SurfaceCapabilitiesKHR {
            supported_transforms: vk::SurfaceTransformFlagsKHR::ROTATE_90,
            current_transform: vk::SurfaceTransformFlagsKHR::ROTATE_90,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE
                | vk::CompositeAlphaFlagsKHR::INHERIT,
            ..flexible_caps()
        };
        assert_eq!(
            select_pre_transform(&caps),
            vk::SurfaceTransformFlagsKHR::ROTATE_90
        );
        assert_eq!(
            select_composite_alpha(&caps),
            vk::CompositeAlphaFlagsKHR::INHERIT
        );

        let identity = vk::SurfaceCapabilitiesKHR {
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY
                | vk::SurfaceTransformFlagsKHR::ROTATE_90,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            ..caps
        };
        assert_eq!(
            select_pre_transform(&identity),
            vk::SurfaceTransformFlagsKHR::IDENTITY
        );
        assert_eq!(
            select_composite_alpha(&identity),
            vk::CompositeAlphaFlagsKHR::OPAQUE
        );
    }
}
