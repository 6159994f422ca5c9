use dealflow_core::{Opportunity, OpportunityId, Status, StatusSet};

/// A card's place in its column. Ranks are never reused within a board, and
/// each column keeps its cards in ascending rank order.
pub type Rank = i64;

#[derive(Debug, Clone)]
pub struct Column {
    pub status: Status,
    pub cards: Vec<Opportunity>,
    ranks: Vec<Rank>,
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.status == other.status && self.cards == other.cards
    }
}

impl Eq for Column {}

/// Opportunities grouped by status, one column per configured status in set
/// order. A card's `status` always equals the status of the column holding it.
#[derive(Debug, Clone)]
pub struct Board {
    columns: Vec<Column>,
    next_head: Rank,
    next_tail: Rank,
}

impl PartialEq for Board {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

impl Eq for Board {}

impl Board {
    pub fn new(statuses: &StatusSet) -> Self {
        Self {
            columns: statuses
                .iter()
                .map(|status| Column {
                    status: status.clone(),
                    cards: Vec::new(),
                    ranks: Vec::new(),
                })
                .collect(),
            next_head: -1,
            next_tail: 0,
        }
    }

    /// Groups records by status, preserving their input order within each
    /// column. Records whose status is not in the set are returned separately.
    pub fn from_records(
        statuses: &StatusSet,
        records: Vec<Opportunity>,
    ) -> (Self, Vec<Opportunity>) {
        let mut board = Self::new(statuses);
        let mut rejected = Vec::new();
        for record in records {
            if let Err(record) = board.push_back(record) {
                rejected.push(record);
            }
        }
        (board, rejected)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, status: &Status) -> Option<&Column> {
        self.columns.iter().find(|c| &c.status == status)
    }

    /// Cards under `status`; empty for statuses outside the set.
    pub fn cards(&self, status: &Status) -> &[Opportunity] {
        self.column(status).map(|c| c.cards.as_slice()).unwrap_or(&[])
    }

    pub fn ids(&self, status: &Status) -> Vec<OpportunityId> {
        self.cards(status).iter().map(|c| c.id).collect()
    }

    pub fn position(&self, id: OpportunityId) -> Option<(Status, usize)> {
        self.columns.iter().find_map(|column| {
            column
                .cards
                .iter()
                .position(|c| c.id == id)
                .map(|index| (column.status.clone(), index))
        })
    }

    pub fn get(&self, id: OpportunityId) -> Option<&Opportunity> {
        self.columns
            .iter()
            .flat_map(|c| c.cards.iter())
            .find(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.columns.iter().map(|c| c.cards.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn column_index(&self, status: &Status) -> Option<usize> {
        self.columns.iter().position(|c| &c.status == status)
    }

    /// Removes a card, returning it with the rank it held in its column.
    pub(crate) fn take(&mut self, id: OpportunityId) -> Option<(Opportunity, Rank)> {
        self.columns.iter_mut().find_map(|column| {
            let index = column.cards.iter().position(|c| c.id == id)?;
            Some((column.cards.remove(index), column.ranks.remove(index)))
        })
    }

    /// Appends to the tail of the card's status column.
    pub(crate) fn push_back(&mut self, card: Opportunity) -> Result<(), Opportunity> {
        let Some(col) = self.column_index(&card.status) else {
            return Err(card);
        };
        let rank = self.next_tail;
        self.next_tail += 1;
        let column = &mut self.columns[col];
        column.cards.push(card);
        column.ranks.push(rank);
        Ok(())
    }

    /// Inserts at the head of the card's status column.
    pub(crate) fn push_front(&mut self, card: Opportunity) -> Result<(), Opportunity> {
        let Some(col) = self.column_index(&card.status) else {
            return Err(card);
        };
        let rank = self.next_head;
        self.next_head -= 1;
        let column = &mut self.columns[col];
        column.cards.insert(0, card);
        column.ranks.insert(0, rank);
        Ok(())
    }

    /// Puts a card back at a rank it held earlier, among whatever cards the
    /// column holds now.
    pub(crate) fn insert_ranked(
        &mut self,
        card: Opportunity,
        rank: Rank,
    ) -> Result<(), Opportunity> {
        let Some(col) = self.column_index(&card.status) else {
            return Err(card);
        };
        let column = &mut self.columns[col];
        let index = column.ranks.partition_point(|r| *r < rank);
        column.cards.insert(index, card);
        column.ranks.insert(index, rank);
        Ok(())
    }

    /// Swaps in `card` wherever a card with the same id sits. The caller
    /// guarantees the status is unchanged.
    pub(crate) fn replace_in_place(&mut self, card: Opportunity) -> bool {
        for column in &mut self.columns {
            if let Some(slot) = column.cards.iter_mut().find(|c| c.id == card.id) {
                *slot = card;
                return true;
            }
        }
        false
    }
}
