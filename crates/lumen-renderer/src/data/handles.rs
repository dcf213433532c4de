/// Index-typed handles rather than pointers, per the "pointer graphs to
/// indices" redesign flag: lookups are fallible slab indices, never raw
/// references, so a stale handle is a `None`, not a dangling pointer.
macro_rules! index_handle {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub const INVALID: Self = Self(u32::MAX);

            pub fn is_valid(self) -> bool {
                self.0 != u32::MAX
            }
        }
    };
}

index_handle!(MeshId);
index_handle!(InstanceId);
index_handle!(MaterialId);
index_handle!(LightId);
index_handle!(ClusterId);
index_handle!(HierarchyNodeId);
index_handle!(ShaderId);
index_handle!(PipelineId);
