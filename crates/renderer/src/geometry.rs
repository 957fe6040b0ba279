//! Static geometry store.
//!
//! Every mesh of the asset set is packed into one device-local buffer:
//! all vertices first, then all indices. The buffer is filled once through
//! a staging buffer and never written again.
//!
//! ```text
//! | mesh 0 vertices | mesh 1 vertices | ... | mesh 0 indices | mesh 1 indices | ... |
//! ^ 0                                       ^ index_offset = vertex_count * 44
//! ```
//!
//! Indices stay mesh-local; each [`MeshRecord`] carries the base vertex used
//! when drawing.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use forward_resources::{Assets, MeshData};
use forward_rhi::buffer::{Buffer, BufferUsage};
use forward_rhi::command::{CommandPool, OneShotCommands};
use forward_rhi::device::Device;
use forward_rhi::physical_device::QueueRole;
use forward_rhi::vertex::{DEFAULT_NORMAL, DEFAULT_TANGENT, DEFAULT_UV, Vertex};
use forward_rhi::{RhiError, RhiResult};

/// Where one mesh lives inside the shared geometry buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshRecord {
    /// Mesh identifier from the asset set.
    pub id: u32,
    pub index_count: u32,
    /// First index of the mesh within the index region.
    pub first_index: u32,
    /// Added to every index of the mesh when drawing.
    pub vertex_offset: i32,
}

/// Total vertex and index counts of a mesh set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GeometryCounts {
    pub vertices: usize,
    pub indices: usize,
}

impl GeometryCounts {
    /// Byte offset of the index region.
    pub fn index_offset(&self) -> vk::DeviceSize {
        (self.vertices * Vertex::STRIDE as usize) as vk::DeviceSize
    }

    /// Total buffer size in bytes.
    pub fn buffer_size(&self) -> vk::DeviceSize {
        self.index_offset() + (self.indices * std::mem::size_of::<u32>()) as vk::DeviceSize
    }

    pub fn is_empty(&self) -> bool {
        self.vertices == 0
    }
}

/// Sums vertex and index counts over `meshes`.
pub fn count_geometry<M: MeshData>(meshes: &[M]) -> GeometryCounts {
    meshes
        .iter()
        .fold(GeometryCounts::default(), |counts, mesh| GeometryCounts {
            vertices: counts.vertices + mesh.vertex_count(),
            indices: counts.indices + mesh.index_count(),
        })
}

/// Appends the vertices of `mesh` to `out`.
///
/// One vertex is emitted per position. Attribute streams shorter than the
/// position stream are padded with the defaults from
/// [`forward_rhi::vertex`].
pub fn emit_vertices<M: MeshData>(mesh: &M, out: &mut Vec<Vertex>) {
    let normals = mesh.normals();
    let tangents = mesh.tangents();
    let uvs = mesh.uvs();

    out.extend(mesh.positions().iter().enumerate().map(|(i, &position)| {
        Vertex::new(
            position,
            normals.get(i).copied().unwrap_or(DEFAULT_NORMAL),
            tangents.get(i).copied().unwrap_or(DEFAULT_TANGENT),
            uvs.get(i).copied().unwrap_or(DEFAULT_UV),
        )
    }));
}

/// Builds mesh records in asset order.
pub fn build_mesh_records<M: MeshData>(meshes: &[M]) -> Vec<MeshRecord> {
    let mut first_index = 0u32;
    let mut vertex_offset = 0i32;

    meshes
        .iter()
        .map(|mesh| {
            let record = MeshRecord {
                id: mesh.id(),
                index_count: mesh.index_count() as u32,
                first_index,
                vertex_offset,
            };
            first_index += record.index_count;
            vertex_offset += mesh.vertex_count() as i32;
            record
        })
        .collect()
}

/// Packs every mesh into the staging byte layout.
pub fn pack_geometry<M: MeshData>(meshes: &[M], counts: GeometryCounts) -> Vec<u8> {
    let mut vertices = Vec::with_capacity(counts.vertices);
    let mut indices = Vec::with_capacity(counts.indices);
    for mesh in meshes {
        emit_vertices(mesh, &mut vertices);
        indices.extend_from_slice(mesh.indices());
    }

    let mut bytes = Vec::with_capacity(counts.buffer_size() as usize);
    bytes.extend_from_slice(bytemuck::cast_slice(&vertices));
    bytes.extend_from_slice(bytemuck::cast_slice(&indices));
    bytes
}

/// Device-local vertex and index data for the whole asset set.
pub struct StaticGeometryStore {
    buffer: Option<Buffer>,
    records: Vec<MeshRecord>,
    counts: GeometryCounts,
    /// `None` when nothing was uploaded.
    handoff: Option<UploadHandoff>,
}

impl StaticGeometryStore {
    /// Uploads every mesh of `assets`.
    ///
    /// Blocks until the transfer completes. An empty asset set yields an
    /// empty store that draws nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the assets fail validation or any buffer,
    /// command or submission step fails. Buffers created so far are released.
    pub fn new<A: Assets>(device: Arc<Device>, assets: &A) -> RhiResult<Self> {
        assets
            .validate()
            .map_err(|e| RhiError::InvalidHandle(format!("invalid assets: {}", e)))?;

        let meshes = assets.meshes();
        let counts = count_geometry(meshes);
        let records = build_mesh_records(meshes);

        if counts.is_empty() {
            info!("Static geometry store is empty");
            return Ok(Self {
                buffer: None,
                records,
                counts,
                handoff: None,
            });
        }

        let bytes = pack_geometry(meshes, counts);
        let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, &bytes)?;
        let buffer = Buffer::new(
            device.clone(),
            BufferUsage::GeometryDeviceLocal,
            counts.buffer_size(),
        )?;

        let handoff = UploadHandoff::for_families(
            device.queue_family(QueueRole::Transfer),
            device.queue_family(QueueRole::Render),
        );
        upload(&device, handoff, &staging, &buffer)?;
        drop(staging);

        info!(
            "Static geometry uploaded: {} mesh(es), {} vertices, {} indices ({} bytes)",
            records.len(),
            counts.vertices,
            counts.indices,
            counts.buffer_size()
        );

        Ok(Self {
            buffer: Some(buffer),
            records,
            counts,
            handoff: Some(handoff),
        })
    }

    /// The geometry buffer, `None` if the store is empty or cleared.
    #[inline]
    pub fn buffer(&self) -> Option<&Buffer> {
        self.buffer.as_ref()
    }

    #[inline]
    pub fn records(&self) -> &[MeshRecord] {
        &self.records
    }

    #[inline]
    pub fn counts(&self) -> GeometryCounts {
        self.counts
    }

    /// How the uploaded buffer reached the render queue.
    #[inline]
    pub fn handoff(&self) -> Option<UploadHandoff> {
        self.handoff
    }

    /// Byte offset of the index region.
    #[inline]
    pub fn index_offset(&self) -> vk::DeviceSize {
        self.counts.index_offset()
    }

    /// Releases the buffer. Safe to call repeatedly.
    pub fn clear(&mut self) {
        if let Some(mut buffer) = self.buffer.take() {
            buffer.clear();
            debug!("Static geometry store cleared");
        }
    }
}

impl Drop for StaticGeometryStore {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Stage masks and barrier of one side of the upload.
pub type StagedBarrier = (
    vk::PipelineStageFlags,
    vk::PipelineStageFlags,
    vk::BufferMemoryBarrier<'static>,
);

const GEOMETRY_READ: vk::AccessFlags = vk::AccessFlags::from_raw(
    vk::AccessFlags::VERTEX_ATTRIBUTE_READ.as_raw() | vk::AccessFlags::INDEX_READ.as_raw(),
);

/// How the geometry buffer passes from the transfer queue to the render
/// queue after the copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadHandoff {
    /// One family does both; a single barrier makes the copy visible.
    Shared,
    /// Ownership is released on `from` and acquired on `to`.
    Transfer { from: u32, to: u32 },
}

impl UploadHandoff {
    pub fn for_families(transfer_family: u32, render_family: u32) -> Self {
        if transfer_family == render_family {
            Self::Shared
        } else {
            Self::Transfer {
                from: transfer_family,
                to: render_family,
            }
        }
    }

    /// Barrier recorded after the copy on the transfer queue.
    pub fn copy_barrier(self, buffer: vk::Buffer) -> StagedBarrier {
        match self {
            Self::Shared => (
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::VERTEX_INPUT,
                buffer_barrier(buffer, vk::QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED)
                    .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .dst_access_mask(GEOMETRY_READ),
            ),
            Self::Transfer { from, to } => (
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                buffer_barrier(buffer, from, to)
                    .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .dst_access_mask(vk::AccessFlags::empty()),
            ),
        }
    }

    /// Barrier recorded on the render queue, only for an ownership transfer.
    pub fn acquire_barrier(self, buffer: vk::Buffer) -> Option<StagedBarrier> {
        match self {
            Self::Shared => None,
            Self::Transfer { from, to } => Some((
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::VERTEX_INPUT,
                buffer_barrier(buffer, from, to)
                    .src_access_mask(vk::AccessFlags::empty())
                    .dst_access_mask(GEOMETRY_READ),
            )),
        }
    }
}

/// Copies `staging` into `buffer` on the transfer queue and hands the buffer
/// to the render queue family.
fn upload(device: &Arc<Device>, handoff: UploadHandoff, staging: &Buffer, buffer: &Buffer) -> RhiResult<()> {
    let transfer_pool = CommandPool::new_transient(device.clone(), QueueRole::Transfer)?;
    let copy = OneShotCommands::begin(&transfer_pool)?;
    copy.commands()
        .copy_buffer(staging.handle(), buffer.handle(), buffer.size());
    let (src_stage, dst_stage, barrier) = handoff.copy_barrier(buffer.handle());
    copy.commands().buffer_barrier(src_stage, dst_stage, barrier);
    copy.submit_and_wait(u64::MAX)?;

    if let Some((src_stage, dst_stage, barrier)) = handoff.acquire_barrier(buffer.handle()) {
        let render_pool = CommandPool::new_transient(device.clone(), QueueRole::Render)?;
        let acquire = OneShotCommands::begin(&render_pool)?;
        acquire.commands().buffer_barrier(src_stage, dst_stage, barrier);
        acquire.submit_and_wait(u64::MAX)?;

        debug!("Geometry buffer ownership moved: {:?}", handoff);
    }

    Ok(())
}

fn buffer_barrier(buffer: vk::Buffer, src_family: u32, dst_family: u32) -> vk::BufferMemoryBarrier<'static> {
    vk::BufferMemoryBarrier::default()
        .src_queue_family_index(src_family)
        .dst_queue_family_index(dst_family)
        .buffer(buffer)
        .offset(0)
        .size(vk::WHOLE_SIZE)
}
