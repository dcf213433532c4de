use crate::device::Device;
use crate::error::Result;
use ash::vk;

/// Per-frame synchronization primitives: the two binary semaphores needed
/// to hand a swapchain image between acquire and present, plus a fence the
/// orchestrator waits on before reusing this frame's resources.
pub struct FrameSync {
    pub acquire: vk::Semaphore,
    pub release: vk::Semaphore,
    pub in_flight: vk::Fence,
}

impl FrameSync {
    pub fn create(device: &Device) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        Ok(Self {
            acquire: unsafe { device.create_semaphore(&semaphore_info, None)? },
            release: unsafe { device.create_semaphore(&semaphore_info, None)? },
            in_flight: unsafe { device.create_fence(&fence_info, None)? },
        })
    }

    pub fn wait_and_reset(&self, device: &Device) -> Result<()> {
        unsafe {
            device.wait_for_fences(&[self.in_flight], true, u64::MAX)?;
            device.reset_fences(&[self.in_flight])?;
        }
        Ok(())
    }

    pub fn destroy(&self, device: &Device) {
        unsafe {
            device.destroy_semaphore(self.acquire, None);
            device.destroy_semaphore(self.release, None);
            device.destroy_fence(self.in_flight, None);
        }
    }
}

/// A dedicated fence for off-hot-path host readback (stats buffer,
/// debug capture) — never waited on during normal frame submission.
pub struct ReadbackFence {
    pub fence: vk::Fence,
}

impl ReadbackFence {
    pub fn create(device: &Device) -> Result<Self> {
        let info = vk::FenceCreateInfo::builder();
        Ok(Self {
            fence: unsafe { device.create_fence(&info, None)? },
        })
    }

    /// Waits with a bounded timeout; a timeout here is a *readback*
    /// failure per the error-handling design, not a fatal device loss.
    pub fn wait_timeout(&self, device: &Device, timeout_ns: u64) -> Result<bool> {
        match unsafe { device.wait_for_fences(&[self.fence], true, timeout_ns) } {
            Ok(()) => {
                unsafe { device.reset_fences(&[self.fence])? };
                Ok(true)
            }
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn destroy(&self, device: &Device) {
        unsafe { device.destroy_fence(self.fence, None) };
    }
}
