//! The four fixed descriptor set layouts and the pool binding sets come from.

use ash::vk;
use tracing::info;

use super::device::Device;
use crate::desc::BindingLayout;
use crate::error::{RhiError, RhiResult};

/// One resolved binding, ready to be written into a set.
#[derive(Clone, Copy, Debug)]
pub enum DescriptorWrite {
    Uniform(vk::Buffer),
    Texture {
        view: vk::ImageView,
        sampler: vk::Sampler,
    },
}

fn layout_bindings(layout: BindingLayout) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
    let uniform = |binding: u32, stages: vk::ShaderStageFlags| {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(stages)
    };
    let all = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;

    match layout {
        // camera, lights
        BindingLayout::Global => vec![uniform(0, all), uniform(1, vk::ShaderStageFlags::FRAGMENT)],
        BindingLayout::Model | BindingLayout::Object => {
            vec![uniform(0, vk::ShaderStageFlags::VERTEX)]
        }
        BindingLayout::Texture => vec![
            vk::DescriptorSetLayoutBinding::default()
                .binding(0)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::FRAGMENT),
        ],
    }
}

/// Set layouts for every [`BindingLayout`] plus a shared, freeable pool.
pub struct Descriptors {
    layouts: [vk::DescriptorSetLayout; 4],
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl Descriptors {
    pub fn new(device: &Device, max_sets: u32) -> RhiResult<Self> {
        let mut layouts = [vk::DescriptorSetLayout::null(); 4];
        for layout in BindingLayout::ALL {
            let bindings = layout_bindings(layout);
            let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
            match unsafe { device.handle().create_descriptor_set_layout(&create_info, None) } {
                Ok(handle) => layouts[layout.set_index() as usize] = handle,
                Err(e) => {
                    destroy_layouts(device, &layouts);
                    return Err(e.into());
                }
            }
        }

        // Global sets hold two uniforms; every other set holds at most one.
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: max_sets * 2,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: max_sets,
            },
        ];
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);
        let pool = match unsafe { device.handle().create_descriptor_pool(&create_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                destroy_layouts(device, &layouts);
                return Err(e.into());
            }
        };

        info!("Descriptor pool created (max {} sets)", max_sets);
        Ok(Self {
            layouts,
            pool,
            max_sets,
        })
    }

    #[inline]
    pub fn layout(&self, layout: BindingLayout) -> vk::DescriptorSetLayout {
        self.layouts[layout.set_index() as usize]
    }

    /// Layouts in set-index order, for the pipeline layout.
    #[inline]
    pub fn layouts(&self) -> &[vk::DescriptorSetLayout; 4] {
        &self.layouts
    }

    /// Allocate a set for `layout` and write `writes` into consecutive bindings.
    pub fn allocate(
        &self,
        device: &Device,
        layout: BindingLayout,
        writes: &[DescriptorWrite],
    ) -> RhiResult<vk::DescriptorSet> {
        let set_layouts = [self.layout(layout)];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&set_layouts);
        let set = match unsafe { device.handle().allocate_descriptor_sets(&allocate_info) } {
            Ok(sets) => sets[0],
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                return Err(RhiError::Pipeline(format!(
                    "descriptor pool exhausted ({} sets)",
                    self.max_sets
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let buffer_infos: Vec<[vk::DescriptorBufferInfo; 1]> = writes
            .iter()
            .map(|write| match *write {
                DescriptorWrite::Uniform(buffer) => [vk::DescriptorBufferInfo {
                    buffer,
                    offset: 0,
                    range: vk::WHOLE_SIZE,
                }],
                DescriptorWrite::Texture { .. } => [vk::DescriptorBufferInfo::default()],
            })
            .collect();
        let image_infos: Vec<[vk::DescriptorImageInfo; 1]> = writes
            .iter()
            .map(|write| match *write {
                DescriptorWrite::Texture { view, sampler } => [vk::DescriptorImageInfo {
                    sampler,
                    image_view: view,
                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                }],
                DescriptorWrite::Uniform(_) => [vk::DescriptorImageInfo::default()],
            })
            .collect();

        let descriptor_writes: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .enumerate()
            .map(|(binding, write)| {
                let base = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(binding as u32);
                match write {
                    DescriptorWrite::Uniform(_) => base
                        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                        .buffer_info(&buffer_infos[binding]),
                    DescriptorWrite::Texture { .. } => base
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .image_info(&image_infos[binding]),
                }
            })
            .collect();

        unsafe { device.handle().update_descriptor_sets(&descriptor_writes, &[]) };
        Ok(set)
    }

    pub fn free(&self, device: &Device, set: vk::DescriptorSet) -> RhiResult<()> {
        unsafe { device.handle().free_descriptor_sets(self.pool, &[set])? };
        Ok(())
    }

    pub fn destroy(self, device: &Device) {
        unsafe { device.handle().destroy_descriptor_pool(self.pool, None) };
        destroy_layouts(device, &self.layouts);
    }
}

fn destroy_layouts(device: &Device, layouts: &[vk::DescriptorSetLayout]) {
    for &layout in layouts {
        if layout != vk::DescriptorSetLayout::null() {
            unsafe { device.handle().destroy_descriptor_set_layout(layout, None) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_bindings_match_binding_counts() {
        for layout in BindingLayout::ALL {
            assert_eq!(layout_bindings(layout).len(), layout.binding_count());
        }
    }

    #[test]
    fn test_texture_layout_is_combined_sampler() {
        let bindings = layout_bindings(BindingLayout::Texture);
        assert_eq!(
            bindings[0].descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_global_layout_has_camera_and_lights() {
        let bindings = layout_bindings(BindingLayout::Global);
        let numbers: Vec<u32> = bindings.iter().map(|b| b.binding).collect();
        assert_eq!(numbers, vec![0, 1]);
        assert!(bindings
            .iter()
            .all(|b| b.descriptor_type == vk::DescriptorType::UNIFORM_BUFFER));
    }
}
