// Copyright 2025 The Drasi Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The tables this connector syncs.

use std::sync::Arc;

use crate::client::{cloud_multiplex, folder_multiplex, Service};
use crate::resolvers::{
    ByParent, CloudFolders, FolderList, GlobalList, IncrementalFolderList, ListCall,
    NetworkSubnets,
};
use ycsync_lib::schema::{Column, ColumnType, Table, Tables};

const CLOUDS: ListCall = ListCall::new(
    Service::ResourceManager,
    "/resource-manager/v1/clouds",
    "clouds",
);
const FOLDERS: ListCall = ListCall::new(
    Service::ResourceManager,
    "/resource-manager/v1/folders",
    "folders",
);
const INSTANCES: ListCall = ListCall::new(Service::Compute, "/compute/v1/instances", "instances");
const DISKS: ListCall = ListCall::new(Service::Compute, "/compute/v1/disks", "disks");
const IMAGES: ListCall = ListCall::new(Service::Compute, "/compute/v1/images", "images");
const SNAPSHOTS: ListCall = ListCall::new(Service::Compute, "/compute/v1/snapshots", "snapshots");
const NETWORKS: ListCall = ListCall::new(Service::Vpc, "/vpc/v1/networks", "networks");
const SECURITY_GROUPS: ListCall =
    ListCall::new(Service::Vpc, "/vpc/v1/securityGroups", "securityGroups");
const SERVICE_ACCOUNTS: ListCall =
    ListCall::new(Service::Iam, "/iam/v1/serviceAccounts", "serviceAccounts");
const IAM_KEYS: ListCall = ListCall::new(Service::Iam, "/iam/v1/keys", "keys");
const ACCESS_KEYS: ListCall = ListCall::new(
    Service::Iam,
    "/iam/aws-compatibility/v1/accessKeys",
    "accessKeys",
);
const BUCKETS: ListCall = ListCall::new(Service::Storage, "/storage/v1/buckets", "buckets");
const KMS_KEYS: ListCall = ListCall::new(Service::Kms, "/kms/v1/keys", "keys");

fn id() -> Column {
    Column::new("id", ColumnType::String, "/id").primary_key()
}

fn string(name: &str, pointer: &str) -> Column {
    Column::new(name, ColumnType::String, pointer)
}

fn json(name: &str, pointer: &str) -> Column {
    Column::new(name, ColumnType::Json, pointer)
}

/// Columns most resources share.
fn common() -> Vec<Column> {
    vec![
        id(),
        string("folder_id", "/folderId"),
        Column::new("created_at", ColumnType::Timestamp, "/createdAt"),
        string("name", "/name"),
        string("description", "/description"),
        json("labels", "/labels"),
    ]
}

fn with(mut base: Vec<Column>, extra: Vec<Column>) -> Vec<Column> {
    base.extend(extra);
    base
}

fn clouds() -> Table {
    Table::new("yc_resourcemanager_clouds", Arc::new(GlobalList(CLOUDS)))
        .with_description("Clouds visible to the credentials")
        .with_columns(vec![
            id(),
            string("name", "/name"),
            string("description", "/description"),
            Column::new("created_at", ColumnType::Timestamp, "/createdAt"),
            string("organization_id", "/organizationId"),
            json("labels", "/labels"),
        ])
        .with_relation(folders())
}

fn folders() -> Table {
    Table::new("yc_resourcemanager_folders", Arc::new(CloudFolders(FOLDERS)))
        .with_description("Folders of a cloud")
        .with_multiplex(cloud_multiplex)
        .with_columns(vec![
            id(),
            string("cloud_id", "/cloudId"),
            Column::new("created_at", ColumnType::Timestamp, "/createdAt"),
            string("name", "/name"),
            string("description", "/description"),
            string("status", "/status"),
            json("labels", "/labels"),
        ])
}

fn instances() -> Table {
    Table::new("yc_compute_instances", Arc::new(FolderList(INSTANCES)))
        .with_description("Compute Cloud virtual machines")
        .with_multiplex(folder_multiplex)
        .with_columns(with(
            common(),
            vec![
                string("zone_id", "/zoneId"),
                string("platform_id", "/platformId"),
                string("status", "/status"),
                string("fqdn", "/fqdn"),
                string("service_account_id", "/serviceAccountId"),
                json("resources", "/resources"),
                json("boot_disk", "/bootDisk"),
                json("secondary_disks", "/secondaryDisks"),
                json("network_interfaces", "/networkInterfaces"),
                json("scheduling_policy", "/schedulingPolicy"),
            ],
        ))
}

fn disks() -> Table {
    Table::new("yc_compute_disks", Arc::new(FolderList(DISKS)))
        .with_description("Compute Cloud disks")
        .with_multiplex(folder_multiplex)
        .with_columns(with(
            common(),
            vec![
                string("type_id", "/typeId"),
                string("zone_id", "/zoneId"),
                Column::new("size", ColumnType::Int, "/size"),
                Column::new("block_size", ColumnType::Int, "/blockSize"),
                Column::new("product_ids", ColumnType::StringList, "/productIds"),
                string("status", "/status"),
                string("source_image_id", "/sourceImageId"),
                string("source_snapshot_id", "/sourceSnapshotId"),
                Column::new("instance_ids", ColumnType::StringList, "/instanceIds"),
            ],
        ))
}

fn images() -> Table {
    Table::new("yc_compute_images", Arc::new(FolderList(IMAGES)))
        .with_description("Compute Cloud images")
        .with_multiplex(folder_multiplex)
        .with_columns(with(
            common(),
            vec![
                string("family", "/family"),
                Column::new("storage_size", ColumnType::Int, "/storageSize"),
                Column::new("min_disk_size", ColumnType::Int, "/minDiskSize"),
                Column::new("product_ids", ColumnType::StringList, "/productIds"),
                string("status", "/status"),
                json("os", "/os"),
            ],
        ))
}

fn snapshots() -> Table {
    let resolver = IncrementalFolderList {
        call: SNAPSHOTS,
        table: "yc_compute_snapshots",
        cursor_pointer: "/createdAt",
    };
    Table::new("yc_compute_snapshots", Arc::new(resolver))
        .with_description("Compute Cloud disk snapshots, synced incrementally by creation time")
        .with_multiplex(folder_multiplex)
        .incremental()
        .with_columns(with(
            common(),
            vec![
                Column::new("storage_size", ColumnType::Int, "/storageSize"),
                Column::new("disk_size", ColumnType::Int, "/diskSize"),
                Column::new("product_ids", ColumnType::StringList, "/productIds"),
                string("status", "/status"),
                string("source_disk_id", "/sourceDiskId"),
            ],
        ))
}

fn networks() -> Table {
    Table::new("yc_vpc_networks", Arc::new(FolderList(NETWORKS)))
        .with_description("VPC cloud networks")
        .with_multiplex(folder_multiplex)
        .with_columns(with(
            common(),
            vec![string(
                "default_security_group_id",
                "/defaultSecurityGroupId",
            )],
        ))
        .with_relation(network_subnets())
}

fn network_subnets() -> Table {
    Table::new("yc_vpc_network_subnets", Arc::new(NetworkSubnets))
        .with_description("Subnets of a VPC network")
        .with_multiplex(folder_multiplex)
        .with_columns(with(
            common(),
            vec![
                string("network_id", "/networkId"),
                string("zone_id", "/zoneId"),
                Column::new("v4_cidr_blocks", ColumnType::StringList, "/v4CidrBlocks"),
                Column::new("v6_cidr_blocks", ColumnType::StringList, "/v6CidrBlocks"),
                string("route_table_id", "/routeTableId"),
                json("dhcp_options", "/dhcpOptions"),
            ],
        ))
}

fn security_groups() -> Table {
    Table::new("yc_vpc_security_groups", Arc::new(FolderList(SECURITY_GROUPS)))
        .with_description("VPC security groups")
        .with_multiplex(folder_multiplex)
        .with_columns(with(
            common(),
            vec![
                string("network_id", "/networkId"),
                string("status", "/status"),
                Column::new("default_for_network", ColumnType::Bool, "/defaultForNetwork"),
                json("rules", "/rules"),
            ],
        ))
}

fn service_accounts() -> Table {
    Table::new(
        "yc_iam_service_accounts",
        Arc::new(FolderList(SERVICE_ACCOUNTS)),
    )
    .with_description("IAM service accounts")
    .with_multiplex(folder_multiplex)
    .with_columns(with(
        common(),
        vec![Column::new(
            "last_authenticated_at",
            ColumnType::Timestamp,
            "/lastAuthenticatedAt",
        )],
    ))
    .with_relation(iam_keys())
    .with_relation(access_keys())
}

fn iam_keys() -> Table {
    let resolver = ByParent {
        call: IAM_KEYS,
        param: "serviceAccountId",
        parents: SERVICE_ACCOUNTS,
    };
    Table::new("yc_iam_keys", Arc::new(resolver))
        .with_description("Authorized keys of a service account")
        .with_multiplex(folder_multiplex)
        .with_columns(vec![
            id(),
            string("service_account_id", "/serviceAccountId"),
            string("user_account_id", "/userAccountId"),
            Column::new("created_at", ColumnType::Timestamp, "/createdAt"),
            string("description", "/description"),
            string("key_algorithm", "/keyAlgorithm"),
            string("public_key", "/publicKey"),
        ])
}

fn access_keys() -> Table {
    let resolver = ByParent {
        call: ACCESS_KEYS,
        param: "serviceAccountId",
        parents: SERVICE_ACCOUNTS,
    };
    Table::new("yc_iam_access_keys", Arc::new(resolver))
        .with_description("Static access keys of a service account")
        .with_multiplex(folder_multiplex)
        .with_columns(vec![
            id(),
            string("service_account_id", "/serviceAccountId"),
            Column::new("created_at", ColumnType::Timestamp, "/createdAt"),
            string("description", "/description"),
            string("key_id", "/keyId"),
        ])
}

fn buckets() -> Table {
    Table::new("yc_storage_buckets", Arc::new(FolderList(BUCKETS)))
        .with_description("Object Storage buckets")
        .with_multiplex(folder_multiplex)
        .with_columns(vec![
            Column::new("name", ColumnType::String, "/name").primary_key(),
            string("id", "/id"),
            string("folder_id", "/folderId"),
            Column::new("created_at", ColumnType::Timestamp, "/createdAt"),
            string("default_storage_class", "/defaultStorageClass"),
            Column::new("max_size", ColumnType::Int, "/maxSize"),
            json("anonymous_access_flags", "/anonymousAccessFlags"),
            json("versioning", "/versioning"),
            json("tags", "/tags"),
        ])
}

fn kms_symmetric_keys() -> Table {
    Table::new("yc_kms_symmetric_keys", Arc::new(FolderList(KMS_KEYS)))
        .with_description("KMS symmetric keys")
        .with_multiplex(folder_multiplex)
        .with_columns(with(
            common(),
            vec![
                string("status", "/status"),
                string("default_algorithm", "/defaultAlgorithm"),
                string("rotation_period", "/rotationPeriod"),
                Column::new("rotated_at", ColumnType::Timestamp, "/rotatedAt"),
                Column::new("deletion_protection", ColumnType::Bool, "/deletionProtection"),
                json("primary_version", "/primaryVersion"),
            ],
        ))
}

/// The full table forest, in declaration order.
pub fn tables() -> Tables {
    Tables::new(vec![
        clouds(),
        instances(),
        disks(),
        images(),
        snapshots(),
        networks(),
        security_groups(),
        service_accounts(),
        buckets(),
        kms_symmetric_keys(),
    ])
}
