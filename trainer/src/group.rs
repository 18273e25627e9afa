use std::collections::{BTreeMap, btree_map};

use log::info;
use machine_learning::{
    arch::{Device, Network},
    autograd::Param,
};

use crate::{Result, StructuralErr};

/// A named unit of networks trained by one optimizer.
pub enum NetworkGroup {
    Single(Box<dyn Network>),
    /// An ordered sequence of networks, such as `[encoder, topnet, revnet]`.
    Composite(Vec<Box<dyn Network>>),
}

impl NetworkGroup {
    /// The members of the group, in order.
    pub fn members(&self) -> Vec<&dyn Network> {
        match self {
            NetworkGroup::Single(net) => vec![net.as_ref()],
            NetworkGroup::Composite(nets) => nets.iter().map(|net| net.as_ref()).collect(),
        }
    }

    /// The `i`-th member.
    pub fn get(&self, i: usize) -> Option<&dyn Network> {
        match self {
            NetworkGroup::Single(net) if i == 0 => Some(net.as_ref()),
            NetworkGroup::Single(_) => None,
            NetworkGroup::Composite(nets) => nets.get(i).map(|net| net.as_ref()),
        }
    }

    /// The network of a single group, or the first member of a composite one.
    pub fn primary(&self) -> Option<&dyn Network> {
        self.get(0)
    }

    pub fn len(&self) -> usize {
        match self {
            NetworkGroup::Single(_) => 1,
            NetworkGroup::Composite(nets) => nets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handles to the parameters of every member, concatenated in member order.
    pub fn params(&self) -> Vec<Param> {
        self.members()
            .into_iter()
            .flat_map(|net| net.params())
            .collect()
    }

    /// The total amount of scalars in the group.
    pub fn size(&self) -> usize {
        self.params().iter().map(Param::len).sum()
    }

    /// Moves every member to `device`.
    pub fn to_device(&mut self, device: Device) -> Result<()> {
        match self {
            NetworkGroup::Single(net) => net.to_device(device)?,
            NetworkGroup::Composite(nets) => {
                for net in nets {
                    net.to_device(device)?;
                }
            }
        }

        Ok(())
    }
}

/// Every network group of a model, by name.
#[derive(Default)]
pub struct Networks {
    groups: BTreeMap<String, NetworkGroup>,
}

impl Networks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a group.
    ///
    /// # Returns
    /// An error if a group with the same name already exists.
    pub fn insert(&mut self, name: impl Into<String>, group: NetworkGroup) -> Result<()> {
        match self.groups.entry(name.into()) {
            btree_map::Entry::Occupied(entry) => Err(StructuralErr::DuplicateGroup {
                group: entry.key().clone(),
            }
            .into()),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(group);
                Ok(())
            }
        }
    }

    /// Looks up the group `name`, on behalf of `routine`.
    ///
    /// # Returns
    /// The group or a structural error if there's no group with that name.
    pub fn get(&self, name: &str, routine: &str) -> Result<&NetworkGroup> {
        self.groups.get(name).ok_or_else(|| {
            StructuralErr::UnregisteredGroup {
                group: name.to_string(),
                routine: routine.to_string(),
            }
            .into()
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NetworkGroup)> {
        self.groups.iter().map(|(name, group)| (name.as_str(), group))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Moves every group to `device`.
    ///
    /// # Returns
    /// A resource error naming the first group that couldn't be placed.
    pub fn to_device(&mut self, device: Device) -> Result<()> {
        for (name, group) in self.groups.iter_mut() {
            group.to_device(device)?;
            info!(group = name.as_str(); "placed network group on {device}");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::arch::{FullyConnected, NetworkFactory, activations::ActFn};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::TrainErr;

    fn net(rng: &mut StdRng, dim_in: usize, dim_out: usize) -> Box<dyn Network> {
        FullyConnected::new([4], ActFn::Relu)
            .build(dim_in, dim_out, rng)
            .unwrap()
    }

    #[test]
    fn test_composite_params_follow_member_order() {
        let mut rng = StdRng::seed_from_u64(3);
        let nets = vec![net(&mut rng, 3, 2), net(&mut rng, 2, 5), net(&mut rng, 5, 2)];
        let sizes: Vec<usize> = nets.iter().map(|n| n.size()).collect();
        let first = nets[0].params();

        let group = NetworkGroup::Composite(nets);

        assert_eq!(group.len(), 3);
        assert_eq!(group.size(), sizes.iter().sum::<usize>());
        assert!(group.params()[0].same(&first[0]));
        assert!(group.get(3).is_none());
    }

    #[test]
    fn test_duplicate_groups_are_rejected() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut networks = Networks::new();

        networks
            .insert("generator", NetworkGroup::Single(net(&mut rng, 2, 2)))
            .unwrap();
        let err = networks
            .insert("generator", NetworkGroup::Single(net(&mut rng, 2, 2)))
            .unwrap_err();

        assert!(matches!(
            err,
            TrainErr::Structural(StructuralErr::DuplicateGroup { .. })
        ));
    }

    #[test]
    fn test_unknown_group_lookup_fails() {
        let networks = Networks::new();

        assert!(matches!(
            networks.get("critic", "gan"),
            Err(TrainErr::Structural(StructuralErr::UnregisteredGroup { .. }))
        ));
    }

    #[test]
    fn test_placement_failure_is_a_resource_error() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut networks = Networks::new();
        networks
            .insert("encoder", NetworkGroup::Single(net(&mut rng, 2, 2)))
            .unwrap();

        assert!(networks.to_device(Device::Cpu).is_ok());
        assert!(matches!(
            networks.to_device(Device::Accelerator(0)),
            Err(TrainErr::Resource(_))
        ));
    }
}
